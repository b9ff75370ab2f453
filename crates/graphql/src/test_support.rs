//! Shared fixtures for the API tests.

use serde_json::json;

use vesta_core::models::TxHash;
use vesta_core::ports::RawEvent;
use vesta_core::services::{EventIndexer, IndexerSettings, QueryService};

/// Two 1000-unit grants on `[0, 900]` owned by `0x1111..`, indexed at t=450.
pub(crate) fn seeded_query() -> QueryService {
    let owner = format!("0x{}", "11".repeat(20));
    let deposit = |block: u64, token: u64| RawEvent {
        block_number: block,
        log_index: 0,
        tx_hash: TxHash::from([block as u8; 32]),
        block_timestamp: 450,
        name: "Deposited".to_string(),
        data: json!({
            "grantId": format!("{token}-1"),
            "owner": owner,
            "totalValue": "1000",
            "startTime": 0,
            "maturationTime": 900,
        }),
    };

    let mut indexer = EventIndexer::new(IndexerSettings::default());
    indexer.ingest(vec![deposit(1, 1), deposit(2, 2)]).unwrap();
    indexer.query()
}
