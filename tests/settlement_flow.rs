use ethers::types::{Address, U256};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

use sealed_bid_settlement::bids::{encode_payload, tokens_to_wei, Normalizer};
use sealed_bid_settlement::client::RemotePitchEvaluator;
use sealed_bid_settlement::config::ScoringConfig;
use sealed_bid_settlement::domain::{RawBid, Sale, SaleState, SettlementOutcome};
use sealed_bid_settlement::execution::{SettlementEngine, SettlementError};
use sealed_bid_settlement::registry::SaleRegistry;
use sealed_bid_settlement::scoring::{
    FallbackPitchEvaluator, KeywordPitchEvaluator, PitchEvaluator, ScoringEngine,
};
use sealed_bid_settlement::store::SettlementStore;
use sealed_bid_settlement::wallet::{KeyProvider, LocalKeyProvider};

const AGENT_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
const SALE: u64 = 7;

fn contract() -> Address {
    Address::repeat_byte(0xc0)
}

fn bidder_a() -> Address {
    Address::repeat_byte(0xaa)
}

fn bidder_b() -> Address {
    Address::repeat_byte(0xbb)
}

fn usdc(micro: u64) -> U256 {
    U256::from(micro)
}

fn raw_bid(bidder: Address, price_micro: u64, tokens: u64, max_spend_micro: u64) -> RawBid {
    RawBid {
        sale_id: SALE,
        bidder,
        payload: encode_payload(usdc(price_micro), tokens_to_wei(tokens), "scalable defi", "US")
            .into(),
        max_spend_raw: usdc(max_spend_micro),
    }
}

/// A: 2.0 x 800 with 2000 budget, B: 1.5 x 500 with 1000 budget.
fn two_bidder_scenario() -> Vec<RawBid> {
    vec![
        raw_bid(bidder_b(), 1_500_000, 500, 1_000_000_000),
        raw_bid(bidder_a(), 2_000_000, 800, 2_000_000_000),
    ]
}

async fn expired_registry() -> SaleRegistry {
    let registry = SaleRegistry::new();
    registry
        .register(Sale {
            sale_id: SALE,
            issuer: Address::repeat_byte(0x11),
            supply: 1000,
            deadline: 100,
        })
        .await
        .unwrap();
    registry.expire_due(100).await;
    registry
}

fn engine_with(
    pitch: Arc<dyn PitchEvaluator>,
    store: SettlementStore,
    registry: SaleRegistry,
) -> SettlementEngine {
    let cfg = ScoringConfig::default();
    SettlementEngine::new(
        Normalizer::new(cfg.max_pitch_chars),
        ScoringEngine::new(&cfg, pitch),
        Arc::new(LocalKeyProvider::from_private_key(AGENT_KEY).unwrap()),
        store,
        registry,
        contract(),
    )
}

async fn engine() -> SettlementEngine {
    engine_with(
        Arc::new(KeywordPitchEvaluator),
        SettlementStore::in_memory(),
        expired_registry().await,
    )
}

#[tokio::test]
async fn two_bidder_sale_settles_at_volume_weighted_price() {
    let engine = engine().await;
    let outcome = engine.settle(SALE, &two_bidder_scenario()).await.unwrap();

    assert!(outcome.is_fresh());
    let signed = outcome.signed();
    let result = &signed.result;

    assert_eq!(result.winners, vec![bidder_a(), bidder_b()]);
    assert_eq!(result.allocations[&bidder_a()], 800);
    assert_eq!(result.allocations[&bidder_b()], 200);
    assert_eq!(result.clearing_price, dec!(1.9));
    assert_eq!(result.total_bid_quantity, 1300);
    assert_eq!(result.bid_amounts[&bidder_b()], 500);

    assert!(signed.verify());
    assert!(signed.verify_against(contract(), engine.agent_address()));
    assert_eq!(
        engine.registry().state(SALE).await.map(|s| s.is_settled()),
        Some(true)
    );
}

#[tokio::test]
async fn second_call_returns_identical_settlement() {
    let engine = engine().await;
    let first = engine.settle(SALE, &two_bidder_scenario()).await.unwrap();

    // Different bids on the second call must not matter.
    let second = engine
        .settle(SALE, &[raw_bid(bidder_b(), 9_000_000, 1000, 9_000_000_000)])
        .await
        .unwrap();

    assert!(matches!(second, SettlementOutcome::AlreadySettled(_)));
    assert_eq!(first.signed(), second.signed());
    assert_eq!(first.signed().signature_hex(), second.signed().signature_hex());
    assert_eq!(engine.store().len().await, 1);
}

#[tokio::test]
async fn concurrent_settles_collapse_to_one_signature() {
    let engine = Arc::new(engine().await);
    let bids = two_bidder_scenario();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            let bids = bids.clone();
            tokio::spawn(async move { engine.settle(SALE, &bids).await })
        })
        .collect();

    let mut outcomes = Vec::new();
    for h in handles {
        outcomes.push(h.await.unwrap().unwrap());
    }

    assert_eq!(outcomes.iter().filter(|o| o.is_fresh()).count(), 1);
    let signature = outcomes[0].signed().signature_hex();
    assert!(outcomes.iter().all(|o| o.signed().signature_hex() == signature));
}

#[tokio::test]
async fn unreachable_evaluator_still_settles_deterministically() {
    async fn run() -> SettlementOutcome {
        let remote =
            RemotePitchEvaluator::new("http://127.0.0.1:9/v1/chat/completions", "gpt", "sk-live", 500)
                .unwrap();
        let pitch = Arc::new(FallbackPitchEvaluator::new(remote, Duration::from_millis(500)));
        let engine = engine_with(pitch, SettlementStore::in_memory(), expired_registry().await);
        engine.settle(SALE, &two_bidder_scenario()).await.unwrap()
    }

    let first = run().await;
    let second = run().await;
    assert_eq!(first.signed().result, second.signed().result);
    assert_eq!(first.signed().result.clearing_price, dec!(1.9));
}

#[tokio::test]
async fn zero_bid_sale_settles_empty() {
    let engine = engine().await;
    let outcome = engine.settle(SALE, &[]).await.unwrap();

    let result = &outcome.signed().result;
    assert!(result.winners.is_empty());
    assert!(result.allocations.is_empty());
    assert_eq!(result.clearing_price, dec!(0));
    assert!(outcome.signed().verify());
}

#[tokio::test]
async fn broke_and_broken_bids_are_excluded_not_fatal() {
    let engine = engine().await;
    let mut bids = vec![raw_bid(bidder_a(), 5_000_000, 100, 0)];
    bids.push(RawBid {
        sale_id: SALE,
        bidder: Address::repeat_byte(0x01),
        payload: vec![0xde, 0xad].into(),
        max_spend_raw: usdc(1),
    });
    bids.push(raw_bid(bidder_b(), 1_000_000, 10, 10_000_000));

    let outcome = engine.settle(SALE, &bids).await.unwrap();
    let result = &outcome.signed().result;

    // A scores highest on price but has no budget.
    assert_eq!(result.winners, vec![bidder_b()]);
    assert_eq!(result.bid_amounts.get(&bidder_a()), Some(&100));
    assert!(!result.bid_amounts.contains_key(&Address::repeat_byte(0x01)));
}

#[tokio::test]
async fn oversized_quantities_are_outvoted_not_fatal() {
    let engine = engine().await;
    let half = u64::MAX / 2 + 1;
    let bids = vec![
        raw_bid(bidder_a(), 1_000_000, 100, 100_000_000),
        raw_bid(Address::repeat_byte(0x01), 1_000_000, half, 0),
        raw_bid(Address::repeat_byte(0x02), 1_000_000, half, 0),
    ];

    let outcome = engine.settle(SALE, &bids).await.unwrap();
    let result = &outcome.signed().result;

    assert_eq!(result.winners, vec![bidder_a()]);
    assert_eq!(result.allocations[&bidder_a()], 100);
    assert_eq!(result.total_bid_quantity, 100 + 2 * u128::from(half));
    assert!(engine.store().get(SALE).await.is_some());
}

#[tokio::test]
async fn open_and_unknown_sales_are_refused() {
    let registry = SaleRegistry::new();
    registry
        .register(Sale {
            sale_id: 1,
            issuer: Address::zero(),
            supply: 10,
            deadline: u64::MAX,
        })
        .await
        .unwrap();
    let engine = engine_with(
        Arc::new(KeywordPitchEvaluator),
        SettlementStore::in_memory(),
        registry,
    );

    assert!(matches!(
        engine.settle(1, &[]).await,
        Err(SettlementError::SaleNotExpired { sale_id: 1, .. })
    ));
    assert!(matches!(
        engine.settle(2, &[]).await,
        Err(SettlementError::UnknownSale(2))
    ));
    assert_eq!(engine.registry().state(1).await, Some(SaleState::Open));
}

#[tokio::test]
async fn durable_store_prevents_resigning_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settlements.json");

    let first = {
        let store = SettlementStore::open(&path).await.unwrap();
        let engine = engine_with(Arc::new(KeywordPitchEvaluator), store, expired_registry().await);
        engine.settle(SALE, &two_bidder_scenario()).await.unwrap()
    };

    // Fresh process: empty registry, same file.
    let store = SettlementStore::open(&path).await.unwrap();
    let engine = engine_with(Arc::new(KeywordPitchEvaluator), store, SaleRegistry::new());
    let again = engine.settle(SALE, &[]).await.unwrap();

    assert!(!again.is_fresh());
    assert_eq!(first.signed(), again.signed());
}

#[test]
fn agent_address_is_the_configured_key() {
    let key = LocalKeyProvider::from_private_key(AGENT_KEY).unwrap();
    assert_eq!(
        format!("{:?}", key.address()),
        "0x70997970c51812dc3a010c7d01b50e0d17dc79c8"
    );
}
