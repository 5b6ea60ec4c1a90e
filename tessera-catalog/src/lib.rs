pub mod inventory;

pub use inventory::{Hold, InventoryLedger, LedgerError};
