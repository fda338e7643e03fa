mod ledger;
mod pricing;

pub use ledger::{
    CreditLedger, INCOME_MODEL, PURCHASE_MODEL, PURCHASE_WORKFLOW_ID, SettlementSummary,
};
pub use pricing::{CREDIT_SCALE, PricingTable};
