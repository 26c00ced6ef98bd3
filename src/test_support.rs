//! Helpers for unit tests that talk to a local mock server.

use wiremock::MockServer;

/// Starts a mock server, or `None` when localhost sockets cannot be bound.
pub async fn mock_server() -> Option<MockServer> {
    if std::net::TcpListener::bind("127.0.0.1:0").is_err() {
        eprintln!("cannot bind a localhost socket; skipping mock-server test");
        return None;
    }
    Some(MockServer::start().await)
}
