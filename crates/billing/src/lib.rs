//! Subscription billing domain (plans, subscriptions, invoices).
//!
//! This crate contains the billing rules implemented purely as deterministic
//! domain logic (no IO, no HTTP, no storage). The atomic "subscribe and bill"
//! write is performed by the store; the rows it writes are produced here.

pub mod invoice;
pub mod plan;
pub mod subscription;

pub use invoice::{Invoice, InvoiceStatus};
pub use plan::{NewPlan, Plan, PlanInterval};
pub use subscription::{OpenedSubscription, Subscription, SubscriptionStatus};
