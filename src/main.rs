use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use marketlink::{telemetry, ClientConfig, MarketLink, OrderGateway, OrderRequest, OrderType, Side, StateStore};
use tracing::info;

#[derive(Parser)]
#[command(name = "marketlink", about = "Market data / order client for the matching service")]
struct Cli {
    /// Config file (defaults to ./marketlink.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Overrides API_BASE, e.g. localhost:8000
    #[arg(long, global = true)]
    api_base: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stream both channels and print top of book + recent trades
    Watch {
        /// Only show this symbol
        #[arg(long)]
        symbol: Option<String>,
        /// Trades shown per refresh
        #[arg(long, default_value_t = 5)]
        trades: usize,
        /// Prometheus exporter port (needs the metrics-exporter feature)
        #[arg(long, default_value_t = 9000)]
        metrics_port: u16,
    },
    /// Submit one order and print the result
    Order {
        symbol: String,
        #[arg(value_enum)]
        side: SideArg,
        quantity: f64,
        #[arg(long, value_enum, default_value_t = TypeArg::Limit)]
        order_type: TypeArg,
        #[arg(long)]
        price: Option<f64>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SideArg {
    Buy,
    Sell,
}

#[derive(Clone, Copy, ValueEnum)]
enum TypeArg {
    Market,
    Limit,
    Ioc,
    Fok,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok(); // load .env
    telemetry::init_tracing("marketlink=info");

    let cli = Cli::parse();
    let mut config = ClientConfig::load(cli.config.as_deref())?;
    if let Some(api_base) = cli.api_base {
        config = config.with_api_base(api_base);
        config.validate()?;
    }

    match cli.command {
        Command::Watch { symbol, trades, metrics_port } => {
            telemetry::init_metrics(metrics_port)?;
            watch(&config, symbol, trades).await
        }
        Command::Order { symbol, side, quantity, order_type, price } => {
            let side = match side {
                SideArg::Buy => Side::Buy,
                SideArg::Sell => Side::Sell,
            };
            let order_type = match order_type {
                TypeArg::Market => OrderType::Market,
                TypeArg::Limit => OrderType::Limit,
                TypeArg::Ioc => OrderType::Ioc,
                TypeArg::Fok => OrderType::Fok,
            };
            let request = OrderRequest { symbol, order_type, side, quantity, price };
            let result = OrderGateway::from_config(&config).submit(&request).await?;
            println!(
                "Order {} {}: {} filled, {} remaining @ avg {}",
                result.order_id,
                result.status,
                result.filled_quantity,
                result.remaining_quantity,
                result.average_price.map(|p| p.to_string()).unwrap_or_else(|| "N/A".into()),
            );
            for trade in &result.trades {
                println!("  Trade {}: {} @ {}", trade.trade_id, trade.quantity, trade.price);
            }
            Ok(())
        }
    }
}

async fn watch(config: &ClientConfig, symbol: Option<String>, trade_rows: usize) -> anyhow::Result<()> {
    let link = MarketLink::start(config);
    let store = link.store();
    info!(api_base = %config.api_base, trade_log_capacity = store.trade_log_capacity(), "Watching streams");

    // Log every status transition
    let mut status_rx = link.watch_status();
    let status_task = tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            let status = *status_rx.borrow_and_update();
            info!(
                connected = status.connected,
                market_data = ?status.market_data.state,
                trades = ?status.trades.state,
                md_attempts = status.market_data.reconnect_attempts,
                trade_attempts = status.trades.reconnect_attempts,
                "Connection status"
            );
            if status.any_exhausted() {
                info!("Reconnects exhausted; restart to resume");
            }
        }
    });

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = ticker.tick() => print_state(&store, symbol.as_deref(), trade_rows),
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    println!("Shutting down...");
    link.shutdown().await;
    status_task.abort();
    Ok(())
}

fn print_state(store: &StateStore, only: Option<&str>, trade_rows: usize) {
    let symbols = match only {
        Some(s) => vec![s.to_string()],
        None => store.symbols(),
    };
    for symbol in &symbols {
        let Some(book) = store.snapshot(symbol) else {
            println!("{symbol}: no data");
            continue;
        };
        match (book.best_bid(), book.best_ask()) {
            (Some(bid), Some(ask)) => println!(
                "{symbol}: BID {} @ {} | ASK {} @ {} | Spread {:.2} ({:.3}%)",
                bid.quantity,
                bid.price,
                ask.quantity,
                ask.price,
                book.spread().unwrap_or_default(),
                book.spread_pct().unwrap_or_default(),
            ),
            (Some(bid), None) => println!("{symbol}: BID {} @ {} | ASK: None", bid.quantity, bid.price),
            (None, Some(ask)) => println!("{symbol}: BID: None | ASK {} @ {}", ask.quantity, ask.price),
            (None, None) => println!("{symbol}: empty book"),
        }
    }
    for trade in store.trades(only, Some(trade_rows)) {
        println!(
            "  {} {} {} {} @ {}",
            trade.timestamp, trade.symbol, trade.aggressor_side, trade.quantity, trade.price
        );
    }
}
