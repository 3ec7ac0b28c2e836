use cachesync::config::Config;
use cachesync::{http, FetchRequest, Method, Store};
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cachesync")]
#[command(about = "Fetch, cache and locally edit keyed data from configured endpoints")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/cachesync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
  /// List registered keys
  Keys,
  /// Read a key, serving from cache while fresh
  Fetch {
    key: String,
    /// Path suffix appended to the endpoint, e.g. /5
    #[arg(long)]
    path: Option<String>,
    /// Read this many times to show cache hits
    #[arg(long, default_value_t = 1)]
    repeat: u32,
  },
  /// Send a write through a key's handler
  Send {
    key: String,
    #[arg(short, long, default_value = "POST")]
    method: Method,
    /// JSON payload
    #[arg(short, long)]
    data: Option<String>,
    /// Don't refresh the cache with the result
    #[arg(long)]
    no_cache: bool,
  },
  /// Fetch a key, then delete one record locally
  LocalDelete {
    key: String,
    id: String,
    #[arg(long, default_value = cachesync::store::DEFAULT_ID_KEY)]
    id_key: String,
  },
  /// Fetch a key, then merge fields into one record locally
  LocalEdit {
    key: String,
    id: String,
    /// JSON object of fields to merge
    fields: String,
    #[arg(long, default_value = cachesync::store::DEFAULT_ID_KEY)]
    id_key: String,
  },
}

/// Log to a file in the data directory, or stderr when there isn't one.
fn init_tracing() -> Option<WorkerGuard> {
  let filter = EnvFilter::try_from_env("CACHESYNC_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

  match dirs::data_dir().map(|d| d.join("cachesync")) {
    Some(dir) if std::fs::create_dir_all(&dir).is_ok() => {
      let appender = tracing_appender::rolling::never(dir, "cachesync.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
      Some(guard)
    }
    _ => {
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
      None
    }
  }
}

fn parse_json(input: &str) -> Result<Value> {
  serde_json::from_str(input).map_err(|e| eyre!("Invalid JSON '{}': {}", input, e))
}

fn print_value(value: &Value) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  let _guard = init_tracing();

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  let store = config.build_store();
  http::register_endpoints(&store, &config)?;

  match args.command {
    Commands::Keys => {
      for key in store.registry().keys() {
        println!("{}", key);
      }
    }
    Commands::Fetch { key, path, repeat } => {
      for _ in 0..repeat.max(1) {
        let mut request = FetchRequest::get(&key);
        request.url_path = path.clone();
        match store.resolve(request).await? {
          Some(result) => {
            eprintln!("[{:?}]", result.source);
            print_value(&result.data)?;
          }
          None => eprintln!("(no data)"),
        }
      }
    }
    Commands::Send {
      key,
      method,
      data,
      no_cache,
    } => {
      let mut request = FetchRequest::new(&key, method).keep_cache(!no_cache);
      request.payload = data.as_deref().map(parse_json).transpose()?;
      match store.fetch_data(request).await? {
        Some(value) => print_value(&value)?,
        None => eprintln!("(no data)"),
      }
    }
    Commands::LocalDelete { key, id, id_key } => {
      load(&store, &key).await?;
      store.delete_local(&key, &id_key, id);
      print_value(&store.get(&key).unwrap_or(Value::Null))?;
    }
    Commands::LocalEdit {
      key,
      id,
      fields,
      id_key,
    } => {
      load(&store, &key).await?;
      store.edit_local(&key, &id_key, id, parse_json(&fields)?)?;
      print_value(&store.get(&key).unwrap_or(Value::Null))?;
    }
  }

  Ok(())
}

async fn load(store: &Store, key: &str) -> Result<()> {
  store.fetch_data(FetchRequest::get(key)).await?;
  Ok(())
}
