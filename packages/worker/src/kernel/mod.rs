// Kernel - core infrastructure with dependency injection
//
// The WorkerKernel holds all worker dependencies (central store, tenant
// gateway, messenger ports) behind traits for testability.
//
// IMPORTANT: Kernel is for INFRASTRUCTURE only. The engine and scheduler
// consume it; they do not reach around it to concrete adapters.

pub mod jobs;
pub mod messaging;
pub mod scheduler;
pub mod supervisor;
pub mod tenants;
mod worker_kernel;

pub use supervisor::Supervisor;
pub use worker_kernel::WorkerKernel;
