pub mod server;

#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        dsn: String,
        access_token_minutes: i64,
        refresh_token_days: i64,
    },
}
