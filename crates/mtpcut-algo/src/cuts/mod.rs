//! Cut generation: violation scanning, selection and pools.

pub mod families;
pub mod pool;
pub mod scanner;
pub mod selector;

pub use families::{BranchEnd, InstanceId};
pub use pool::{Cut, CutDraft, CutId, CutPool, CutPools, DroppedCut, RoundCounts};
pub use scanner::{Candidate, FamilyScan, ViolationScanner};
pub use selector::{CutSelector, SelectionRule};
