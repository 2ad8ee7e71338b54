//! Compliance Notifier - Entry Point
//!
//! Renders and delivers one notification through the in-process queue.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    compliance_notifier::run().await
}
