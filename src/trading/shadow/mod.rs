//! 影子路径：独立虚拟账本 + 结算模拟 + 周期编排
//!
//! 影子账本与实盘账本不共享任何可变状态，两者只读取同一份行情快照。

pub mod ledger;
pub mod runner;
pub mod simulator;

pub use ledger::{ShadowAccountState, ShadowLedger, ShadowTrade};
pub use runner::{ShadowCycleContext, ShadowRunner};
pub use simulator::ShadowSimulator;
