pub mod ast;
pub mod error;
pub mod execution;
pub mod plan;
pub mod planner;

pub use ast::{
    AggFunc, AggregateExpr, AstType, ColumnRef, CompOp, Condition, FieldDef, GroupClause, Knob,
    OrderClause, Query, Rhs, SetClause, Statement,
};
pub use error::{QueryError, QueryResult};
pub use execution::{build_executor, ExecContext, Executor, Record};
pub use plan::{DdlKind, DmlKind, JoinKind, Plan, ScanKind, UtilityKind};
pub use planner::{Planner, PlannerKnobs};
