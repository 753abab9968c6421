// Module: formalism/mod.rs
// Acts as a central hub for the formal core: expressions, algebraic solving,
// the GDL data model and the condition store.

pub mod algebra;
pub mod condition;
pub mod expressions;
pub mod gdl;
pub mod problem;
