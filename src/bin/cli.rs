use adachi_kv::{Config, Error, KeyValueStore};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;

/// Inspect and edit the application's data from the command line.
#[derive(Parser, Debug)]
#[command(name = "adachi-kv", version)]
struct Args {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a string value
    Get { key: String },
    /// Write a string value
    Set {
        key: String,
        value: String,
        /// Expire the key after this many seconds
        #[arg(long)]
        ttl: Option<u64>,
    },
    /// Delete keys
    Del {
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// List the keys starting with a prefix
    Keys {
        #[arg(default_value = adachi_kv::keys::NAMESPACE)]
        prefix: String,
    },
    /// Print the remaining time to live of a key
    Ttl { key: String },
    /// Set the time to live of a key
    Expire { key: String, seconds: u64 },
    /// Print a hash field
    Hget { key: String, field: String },
    /// Write a hash field
    Hset {
        key: String,
        field: String,
        value: String,
    },
    /// Print a whole hash
    Hgetall { key: String },
    /// Add to a numeric hash field
    Hincr {
        key: String,
        field: String,
        #[arg(allow_negative_numbers = true)]
        amount: f64,
    },
    /// Print a list
    Lrange { key: String },
    /// Append values to a list
    Rpush {
        key: String,
        #[arg(required = true)]
        values: Vec<String>,
    },
    /// Print the members of a set
    Smembers { key: String },
    /// Add members to a set
    Sadd {
        key: String,
        #[arg(required = true)]
        members: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let args = Args::parse();
    let store = KeyValueStore::connect(&args.config);

    run(&store, args.command).await
}

async fn run(store: &KeyValueStore, command: Command) -> Result<(), Error> {
    match command {
        Command::Get { key } => println!("{}", store.get_string(&key).await?),
        Command::Set { key, value, ttl } => store.set_string(&key, value, ttl).await?,
        Command::Del { keys } => store.delete_key(keys).await?,
        Command::Keys { prefix } => {
            let mut keys = store.get_keys_by_prefix(&prefix).await?;
            keys.sort();
            print_lines(keys);
        }
        Command::Ttl { key } => println!("{}", store.get_timeout(&key).await?),
        Command::Expire { key, seconds } => store.set_timeout(&key, seconds).await?,
        Command::Hget { key, field } => println!("{}", store.get_hash_field(&key, &field).await?),
        Command::Hset { key, field, value } => store.set_hash_field(&key, &field, value).await?,
        Command::Hgetall { key } => {
            // Sorted for stable output.
            let hash: BTreeMap<_, _> = store.get_hash(&key).await?.into_iter().collect();
            for (field, value) in hash {
                println!("{}\t{}", field, value);
            }
        }
        Command::Hincr { key, field, amount } => store.inc_hash(&key, &field, amount).await?,
        Command::Lrange { key } => print_lines(store.get_list(&key).await?),
        Command::Rpush { key, values } => store.add_list_element(&key, values).await?,
        Command::Smembers { key } => {
            let mut members = store.get_set(&key).await?;
            members.sort();
            print_lines(members);
        }
        Command::Sadd { key, members } => store.add_set_member(&key, members).await?,
    }

    Ok(())
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}
