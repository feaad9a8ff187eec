pub mod context;
pub mod engine;
pub mod printer;

pub use context::Context;
pub use engine::Session;
pub use printer::RecordPrinter;
