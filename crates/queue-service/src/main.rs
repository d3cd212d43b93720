//! Command-line entry point for the order queue.
//!
//! Each invocation loads the configuration, builds the queue system with
//! the registered backends, runs one command and prints its result as JSON
//! on stdout. Logs go to stderr. With the `file` storage backend the queue
//! state carries over between invocations.

use clap::{Parser, Subcommand};
use queue_config::Config;
use queue_core::{QueueBuilder, QueueError, QueueFactories, QueueSystem};
use queue_types::{
	MenuItemId, OrderCreated, OrderId, OrderItemRequest, OrderStatusView, ShopId,
	ShopQueueSnapshot,
};
use serde::Serialize;
use std::path::PathBuf;

/// Command-line arguments for the queue service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, env = "QUEUE_CONFIG", default_value = "config/demo.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
enum Command {
	/// Place an order and assign it to a queue
	Create {
		/// Shop to order from
		#[arg(long)]
		shop: ShopId,
		/// Menu item and quantity, repeatable
		#[arg(
			long = "item",
			value_name = "MENU_ITEM:QTY",
			value_parser = parse_item_request,
			required = true
		)]
		items: Vec<OrderItemRequest>,
	},
	/// Mark a waiting order as served
	Serve { order: OrderId },
	/// Cancel a waiting order
	Cancel { order: OrderId },
	/// Show an order with its live position
	Get { order: OrderId },
	/// Show every queue of a shop
	Snapshot { shop: ShopId },
}

/// Result of a command, printed as JSON.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Output {
	Created(OrderCreated),
	Order(OrderStatusView),
	Snapshot(ShopQueueSnapshot),
}

/// Parses `<menu_item_id>:<quantity>`.
fn parse_item_request(raw: &str) -> Result<OrderItemRequest, String> {
	let (id, quantity) = raw
		.rsplit_once(':')
		.ok_or_else(|| format!("expected MENU_ITEM:QTY, got '{}'", raw))?;
	let menu_item_id: MenuItemId = id
		.trim()
		.parse()
		.map_err(|e| format!("invalid menu item id '{}': {}", id, e))?;
	let quantity: i32 = quantity
		.trim()
		.parse()
		.map_err(|e| format!("invalid quantity '{}': {}", quantity, e))?;
	Ok(OrderItemRequest::new(menu_item_id, quantity))
}

/// Main entry point for the queue service.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.with_writer(std::io::stderr)
		.init();

	let config_path = args
		.config
		.to_str()
		.ok_or("configuration path is not valid UTF-8")?;
	let config = Config::from_file(config_path).await?;
	tracing::info!("Loaded configuration [{}]", config.service.id);

	let system = QueueBuilder::new(config).build(QueueFactories::registered())?;

	match execute(&system, args.command).await {
		Ok(output) => {
			println!("{}", serde_json::to_string_pretty(&output)?);
			Ok(())
		},
		Err(e) => {
			tracing::error!(
				kind = %e.kind(),
				retryable = e.is_retryable(),
				error = %e,
				"Command failed"
			);
			Err(e.into())
		},
	}
}

/// Runs one command against the queue system.
async fn execute(system: &QueueSystem, command: Command) -> Result<Output, QueueError> {
	let output = match command {
		Command::Create { shop, items } => Output::Created(system.create_order(shop, &items).await?),
		Command::Serve { order } => {
			system.serve_order(order).await?;
			Output::Order(system.get_order(order).await?)
		},
		Command::Cancel { order } => {
			system.cancel_order(order).await?;
			Output::Order(system.get_order(order).await?)
		},
		Command::Get { order } => Output::Order(system.get_order(order).await?),
		Command::Snapshot { shop } => Output::Snapshot(system.get_shop_queue_snapshot(shop).await?),
	};
	Ok(output)
}
