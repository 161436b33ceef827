use anyhow::{Context, Result};
use clap::Parser;
use ethers::types::Address;
use rust_decimal::Decimal;

use sealed_bid_settlement::bids::{decimal_to_usdc, encode_payload, tokens_to_wei};
use sealed_bid_settlement::monitor::FixtureBid;

/// Builds the ABI bid payload used by fixture feeds.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// USDC per token, e.g. 1.5
    #[arg(long)]
    price: Decimal,

    /// Whole tokens requested
    #[arg(long)]
    quantity: u64,

    #[arg(long, default_value = "")]
    pitch: String,

    #[arg(long, default_value = "US")]
    country: String,

    /// With a bidder, print a complete feed entry instead of bare hex
    #[arg(long)]
    bidder: Option<String>,

    #[arg(long, default_value_t = 1)]
    sale_id: u64,

    /// USDC budget ceiling
    #[arg(long, default_value = "0")]
    max_spend: Decimal,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.price <= Decimal::ZERO {
        anyhow::bail!("price must be positive");
    }

    let payload = encode_payload(
        decimal_to_usdc(args.price),
        tokens_to_wei(args.quantity),
        &args.pitch,
        &args.country,
    );

    match args.bidder {
        None => println!("0x{}", hex::encode(&payload)),
        Some(bidder) => {
            let bidder: Address = bidder
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid bidder address {}: {:?}", bidder, e))?;
            let entry = FixtureBid {
                sale_id: args.sale_id,
                bidder,
                payload: payload.into(),
                max_spend: decimal_to_usdc(args.max_spend).to_string(),
            };
            let json = serde_json::to_string_pretty(&entry).context("rendering feed entry")?;
            println!("{}", json);
        }
    }

    Ok(())
}
