use std::net::SocketAddr;
use std::time::Duration;

use sheetload_testserver::{TestServerConfig, TestServerStats};
use tokio::net::TcpListener;

const USAGE: &str = "sheetload-testserver

USAGE:
  sheetload-testserver [--bind 127.0.0.1:0] [--unhealthy] [--closed-signup] [--latency-ms N]

OUTPUT:
  Prints HTTP_URL=<url> to stdout once ready.";

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let mut bind_addr: SocketAddr = "127.0.0.1:0".parse()?;
    let mut config = TestServerConfig::default();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--bind" => {
                let addr = args.next().ok_or_else(|| {
                    anyhow::anyhow!("--bind requires an address, e.g. 127.0.0.1:0")
                })?;
                bind_addr = addr.parse()?;
            }
            "--unhealthy" => config.healthy = false,
            "--closed-signup" => config.signup_open = false,
            "--latency-ms" => {
                let ms = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--latency-ms requires a number"))?;
                config.latency = Some(Duration::from_millis(ms.parse()?));
            }
            "-h" | "--help" => {
                eprintln!("{USAGE}");
                return Ok(());
            }
            other => {
                return Err(anyhow::anyhow!("unknown argument: {other}"));
            }
        }
    }

    let listener = TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    let app = sheetload_testserver::router(config, TestServerStats::default());

    println!("HTTP_URL=http://{addr}");

    let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
    });

    serve.await?;
    Ok(())
}
