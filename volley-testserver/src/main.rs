use std::net::SocketAddr;

use volley_testserver::TestServer;

const USAGE: &str = "volley-testserver\n\nUSAGE:\n  volley-testserver [--bind 127.0.0.1:0]\n\nLocal target for volley plans. Prints HTTP_URL=<url> and the route list once ready;\nCtrl-C prints the number of requests served and exits.";

fn parse_bind() -> anyhow::Result<Option<SocketAddr>> {
    let mut bind = SocketAddr::from(([127, 0, 0, 1], 0));
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--bind" => {
                let addr = args.next().ok_or_else(|| {
                    anyhow::anyhow!("--bind requires an address, e.g. 127.0.0.1:8080")
                })?;
                bind = addr
                    .parse()
                    .map_err(|err| anyhow::anyhow!("invalid --bind address `{addr}`: {err}"))?;
            }
            "-h" | "--help" => {
                eprintln!("{USAGE}");
                return Ok(None);
            }
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(Some(bind))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let Some(bind) = parse_bind()? else {
        return Ok(());
    };

    let server = TestServer::bind(bind).await?;
    println!("HTTP_URL={}", server.base_url());
    for (name, url) in server.urls().endpoints() {
        println!("  {name:<7} {url}");
    }
    println!("use it from a plan with: volley run <plan.yaml> --var base={}", server.base_url());

    tokio::signal::ctrl_c().await?;
    println!("requests_total={}", server.stats().requests_total());
    server.shutdown().await;
    Ok(())
}
