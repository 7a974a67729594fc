//! Column names of the merchant transaction dataset.

pub const MERCHANT: &str = "Merchant Display Name";
pub const PAYMENT_MODE: &str = "Payment Mode Name";
pub const TRANSACTION_STATUS: &str = "Transaction Status Name";
pub const ACQUIRER_RESPONSE_CODE: &str = "Acquirer Response Code";
pub const TIME_TO_COMPLETE: &str = "Time To Complete";
pub const INTEGRATION_MODE: &str = "Pine Payment Gateway Integration Mode Name";
pub const REFUND_AMOUNT: &str = "Refund Amount";
pub const SETTLEMENT_AMOUNT: &str = "Settlement Amount";
pub const BANK_COMMISSION: &str = "Bank Commision";
pub const CONVENIENCE_FEE: &str = "Convenience Fees Amount In (Paise)";
pub const ACQUIRER_ISSUER_MATCH: &str = "Acquirer Issuer Match";
pub const PAYOUT_STATUS: &str = "Payout Status";
pub const BANK_SERVICE_TAX: &str = "Bank Service Tax";
pub const EXTRA_DEDUCTION: &str = "Amount To Be Deducted";
pub const ACQUIRER_NAME: &str = "Acquirer Name";
pub const DATE: &str = "Date";

/// Status literal counted as a successful transaction.
pub const CAPTURED: &str = "CAPTURED";

/// Columns a dataset must carry to be usable at all.
pub const REQUIRED_COLUMNS: &[&str] = &[
    MERCHANT,
    PAYMENT_MODE,
    TRANSACTION_STATUS,
    ACQUIRER_RESPONSE_CODE,
    TIME_TO_COMPLETE,
    INTEGRATION_MODE,
    REFUND_AMOUNT,
    SETTLEMENT_AMOUNT,
    BANK_COMMISSION,
    CONVENIENCE_FEE,
    ACQUIRER_ISSUER_MATCH,
    PAYOUT_STATUS,
    BANK_SERVICE_TAX,
    EXTRA_DEDUCTION,
    DATE,
];

/// Real-valued columns, coerced to Float64 on load. Refunds may be negative.
pub const NUMERIC_COLUMNS: &[&str] = &[
    TIME_TO_COMPLETE,
    REFUND_AMOUNT,
    SETTLEMENT_AMOUNT,
    BANK_COMMISSION,
    CONVENIENCE_FEE,
    BANK_SERVICE_TAX,
    EXTRA_DEDUCTION,
];

/// Categorical attributes, integer-encoded before causal fitting.
pub const CATEGORICAL_COLUMNS: &[&str] = &[
    PAYMENT_MODE,
    TRANSACTION_STATUS,
    ACQUIRER_RESPONSE_CODE,
    INTEGRATION_MODE,
    ACQUIRER_ISSUER_MATCH,
    PAYOUT_STATUS,
];

/// Prompt-facing description of the columns, one per line.
pub const SCHEMA_DESCRIPTION: &str = r#"- Merchant Display Name             merchant the row belongs to (already filtered)
- Payment Mode Name                 (e.g. "CREDIT/DEBIT CARD", "UPI")
- Transaction Status Name           ("CAPTURED", "REFUNDED", ...)
- Acquirer Response Code            (e.g. "AUTHORIZED", "0")
- Acquirer Name                     acquiring bank, normalise with map_acquirer
- Time To Complete                  seconds from init to capture
- Pine Payment Gateway Integration Mode Name ("SEAMLESS", "REDIRECT")
- Refund Amount                     INR refunded (may be negative)
- Settlement Amount                 INR settled
- Bank Commision                    INR MDR / acquiring fee
- Convenience Fees Amount In (Paise)
- Acquirer Issuer Match             {1, 0}
- Payout Status                     ("PAID", "PENDING")
- Bank Service Tax                  GST on MDR
- Amount To Be Deducted             extra bank charges
- Date                              calendar date, compare with "yyyy-mm-dd" strings"#;
