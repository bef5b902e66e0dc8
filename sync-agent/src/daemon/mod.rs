//! Process lifecycle for the long-running agent.

pub mod shutdown;
