mod adapters;
mod control_loop;
mod controller;
mod host;
mod input;
mod persist;
mod ports;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
