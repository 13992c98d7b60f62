pub mod command;
pub mod event;
pub mod order;

pub use command::{Command, Envelope};
pub use event::{BroadcastEvent, FillView, PersistenceRecord, ResultPayload, TradeRole};
pub use order::{Fill, Order, OrderStatus, Side, StpMode};
