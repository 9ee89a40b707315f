// SPDX-License-Identifier: MIT

pub mod checkpoint;
pub mod executor;
pub mod state;

pub use checkpoint::{Checkpoint, CheckpointStore, MemoryCheckpointStore, SqliteCheckpointStore};
pub use executor::{
    Graph, GraphBuilder, RunOutcome, RunReport, Step, StepEvent, StepResult, Transition, END,
};
pub use state::{StateUpdate, WorkflowState};
