//! Abstract model-provider contract, retry classification, and token
//! budgeting. Concrete vendor wire formats are out of scope (§1); this
//! crate defines only the interface the core consumes (§4.F, §4.G).

pub mod budget;
pub mod error;
pub mod message;
pub mod port;
pub mod retry;
pub mod testing;

pub use budget::{BudgetCheck, TokenBudget, TokenBudgetConfig};
pub use error::{ErrorClass, ProviderError, ProviderResult};
pub use message::{Message, Response, Role, ToolCallRequest, ToolDefinition, ToolResultMessage, Usage};
pub use port::{ProviderPort, TokenSender};
pub use retry::{RetryConfig, RetryPolicy, RetryStatus};
pub use testing::ScriptedProvider;
