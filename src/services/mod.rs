pub mod audit;
pub mod ledger;
