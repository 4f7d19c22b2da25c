/// Keyline command-line client
///
/// Thin wrapper over `RemoteDatabase` for one-shot operations plus a
/// small write/read benchmark.

use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use keyline_client::RemoteDatabase;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "keyline-cli")]
#[command(about = "Keyline database client", long_about = None)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:8501")]
    addr: String,

    /// Database name
    #[arg(short, long, default_value = "main")]
    db: String,

    /// Create the database if it does not exist
    #[arg(short, long)]
    create: bool,

    /// Connect timeout in seconds
    #[arg(short, long, default_value_t = 5)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store a key/value pair
    Put {
        table: String,
        key: String,
        value: String,
    },
    /// Read the value for a key
    Get { table: String, key: String },
    /// Scan a key range in ascending order
    Scan {
        table: String,
        /// Inclusive lower bound
        #[arg(long)]
        lower: Option<String>,
        /// Exclusive upper bound
        #[arg(long)]
        upper: Option<String>,
    },
    /// Delete the database from the server
    Remove,
    /// Measure write and read throughput
    Bench {
        /// Number of key/value pairs
        #[arg(short, long, default_value_t = 100_000)]
        count: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let args = Args::parse();

    if let Command::Remove = args.command {
        RemoteDatabase::remove(&args.addr, &args.db)
            .await
            .context("remove failed")?;
        println!("removed {}", args.db);
        return Ok(());
    }

    let mut db = RemoteDatabase::open_with_timeout(
        &args.addr,
        &args.db,
        args.create,
        Duration::from_secs(args.timeout),
    )
    .await
    .with_context(|| format!("cannot open {} at {}", args.db, args.addr))?;

    match args.command {
        Command::Put { table, key, value } => {
            let txid = db.begin(&table).await?;
            db.put(txid, key.as_bytes(), value.as_bytes()).await?;
            db.commit(txid).await?;
        }
        Command::Get { table, key } => {
            let txid = db.begin(&table).await?;
            let value = db.get(txid, key.as_bytes()).await?;
            db.rollback(txid).await?;
            println!("{}", String::from_utf8_lossy(&value));
        }
        Command::Scan {
            table,
            lower,
            upper,
        } => {
            let txid = db.begin(&table).await?;
            let iterator_id = db
                .lookup(
                    txid,
                    lower.as_deref().map(str::as_bytes),
                    upper.as_deref().map(str::as_bytes),
                )
                .await?;
            let mut rows = 0u64;
            while let Some(entries) = db.next(iterator_id).await? {
                for (key, value) in entries {
                    println!(
                        "{} = {}",
                        String::from_utf8_lossy(&key),
                        String::from_utf8_lossy(&value)
                    );
                    rows += 1;
                }
            }
            db.rollback(txid).await?;
            eprintln!("{} rows", rows);
        }
        Command::Bench { count } => bench(&mut db, count).await?,
        Command::Remove => unreachable!(),
    }

    db.close().await.context("close failed")?;
    Ok(())
}

/// Sequential write pass with fire-and-forget puts, then a full scan,
/// then random-order gets.
async fn bench(db: &mut RemoteDatabase, count: u64) -> anyhow::Result<()> {
    let table = "bench";

    let start = Instant::now();
    let txid = db.begin(table).await?;
    for i in 0..count {
        let key = format!("mykey{}", i);
        let value = format!("myvalue{}", i);
        db.put_nowait(txid, key.as_bytes(), value.as_bytes())
            .await?;
    }
    db.commit(txid).await?;
    report("insert", count, start.elapsed());

    let start = Instant::now();
    let txid = db.begin(table).await?;
    let iterator_id = db.lookup(txid, None, None).await?;
    let mut rows = 0u64;
    while let Some(entries) = db.next(iterator_id).await? {
        rows += entries.len() as u64;
    }
    if rows < count {
        bail!("scan returned {} rows, expected at least {}", rows, count);
    }
    report("scan", rows, start.elapsed());

    let start = Instant::now();
    // Cheap deterministic shuffle; the point is non-sequential access.
    let mut index = 0u64;
    for _ in 0..count {
        index = (index.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407))
            % count.max(1);
        let key = format!("mykey{}", index);
        db.get(txid, key.as_bytes()).await?;
    }
    db.rollback(txid).await?;
    report("random get", count, start.elapsed());

    Ok(())
}

fn report(label: &str, ops: u64, elapsed: Duration) {
    let secs = elapsed.as_secs_f64();
    let rate = if secs > 0.0 { ops as f64 / secs } else { 0.0 };
    println!("{}: {} ops in {:.2}s, {:.0} ops/sec", label, ops, secs, rate);
}
