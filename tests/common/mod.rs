#![allow(dead_code)]

use business_assistant::config::AssistantConfig;
use business_assistant::data::schema::*;
use polars::prelude::*;
use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

/// One synthetic transaction.
#[derive(Clone)]
pub struct Txn {
    pub merchant: &'static str,
    pub status: &'static str,
    pub payment_mode: &'static str,
    pub payout_status: &'static str,
    pub date: String,
    pub refund: f64,
    pub settlement: f64,
}

impl Txn {
    pub fn new(merchant: &'static str, status: &'static str, date: &str) -> Self {
        Self {
            merchant,
            status,
            payment_mode: "UPI",
            payout_status: "PAID",
            date: date.to_string(),
            refund: 0.0,
            settlement: 100.0,
        }
    }
}

/// Writes `rows` as a transactions CSV in a fresh directory and returns its path.
pub fn write_transactions(rows: &[Txn]) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("business-assistant-{}", Uuid::new_v4()));
    fs::create_dir_all(&dir).expect("create temp dir");
    let path = dir.join("transactions.csv");

    let n = rows.len();
    let mut frame = df! [
        MERCHANT => rows.iter().map(|r| r.merchant).collect::<Vec<_>>(),
        PAYMENT_MODE => rows.iter().map(|r| r.payment_mode).collect::<Vec<_>>(),
        TRANSACTION_STATUS => rows.iter().map(|r| r.status).collect::<Vec<_>>(),
        ACQUIRER_RESPONSE_CODE => (0..n).map(|i| if i % 3 == 0 { "AUTHORIZED" } else { "DECLINED" }).collect::<Vec<_>>(),
        TIME_TO_COMPLETE => (0..n).map(|i| 1.0 + (i % 4) as f64).collect::<Vec<_>>(),
        INTEGRATION_MODE => (0..n).map(|i| if i % 4 == 0 { "REDIRECT" } else { "SEAMLESS" }).collect::<Vec<_>>(),
        REFUND_AMOUNT => rows.iter().map(|r| r.refund).collect::<Vec<_>>(),
        SETTLEMENT_AMOUNT => rows.iter().map(|r| r.settlement).collect::<Vec<_>>(),
        BANK_COMMISSION => (0..n).map(|i| 1.0 + (i % 3) as f64).collect::<Vec<_>>(),
        CONVENIENCE_FEE => vec![0.0; n],
        ACQUIRER_ISSUER_MATCH => (0..n).map(|i| (i % 2) as i64).collect::<Vec<_>>(),
        PAYOUT_STATUS => rows.iter().map(|r| r.payout_status).collect::<Vec<_>>(),
        BANK_SERVICE_TAX => (0..n).map(|i| 0.2 + (i % 2) as f64 * 0.1).collect::<Vec<_>>(),
        EXTRA_DEDUCTION => vec![0.5; n],
        ACQUIRER_NAME => (0..n).map(|i| if i % 2 == 0 { "HDFC Bank Ltd" } else { "Axis Bank" }).collect::<Vec<_>>(),
        DATE => rows.iter().map(|r| r.date.clone()).collect::<Vec<_>>()
    ]
    .expect("fixture frame");

    let mut file = fs::File::create(&path).expect("create csv");
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut frame)
        .expect("write csv");
    path
}

/// Two weeks of ordinary days for `merchant`, then a last day where refunds
/// jump and payouts are held.
pub fn refund_spike(merchant: &'static str) -> Vec<Txn> {
    let mut rows = Vec::new();
    for day in 1..=14 {
        let date = format!("2025-05-{:02}", day);
        let spike = day == 14;
        for i in 0..12 {
            let mut txn = Txn::new(merchant, if i % 5 == 0 { "REFUNDED" } else { "CAPTURED" }, &date);
            txn.payment_mode = if i % 2 == 0 { "UPI" } else { "CREDIT/DEBIT CARD" };
            txn.refund = if txn.status == "REFUNDED" { -40.0 } else { 0.0 };
            txn.settlement = 100.0 + (i % 4) as f64 * 25.0;
            if spike && i % 2 == 1 {
                txn.status = "REFUNDED";
                txn.payout_status = "PENDING";
                txn.refund = -150.0;
            }
            txn.settlement += txn.refund;
            rows.push(txn);
        }
    }
    rows
}

/// Config with no API key and a pinned reporting date.
pub fn offline_config(data_path: PathBuf) -> AssistantConfig {
    let mut config = AssistantConfig::from_lookup(|key| match key {
        "ASSISTANT_AS_OF" => Some("2025-05-14".to_string()),
        "CAUSAL_NUM_SAMPLES" => Some("300".to_string()),
        _ => None,
    })
    .expect("offline config");
    config.data_path = data_path;
    config
}
