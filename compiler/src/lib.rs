// nac — netlist architecture compiler
//
// Library root. Backend phases: load -> validate -> schedule -> discover
// -> architect, each exposed as a module.

pub mod clock;
pub mod connect;
pub mod diag;
pub mod discover;
pub mod element;
pub mod export;
pub mod fsm_elem;
pub mod id;
pub mod input;
pub mod netlist;
pub mod pass;
pub mod pipeline;
pub mod pipeline_elem;
pub mod resource;
pub mod rtl;
pub mod schedule;
pub mod timing;
