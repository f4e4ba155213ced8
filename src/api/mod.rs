// ==========================================
// 输送带胶料批次台账 - API 层
// ==========================================
// 职责: 供外部 CRUD/界面层调用的业务入口
// ==========================================

pub mod belt_api;
pub mod error;
pub mod inventory_api;
pub mod validator;

// 重导出核心类型
pub use belt_api::{BeltApi, CreateBeltRequest, UpdateBeltRequest};
pub use error::{ApiError, ApiResult};
pub use inventory_api::{InventoryApi, RegisterBatchRequest};
pub use validator::RequestValidator;
