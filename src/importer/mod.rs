// ==========================================
// 输送带胶料批次台账 - 导入层
// ==========================================
// 职责: 外部胶料主数据导入
// 支持: Excel, CSV
// ==========================================

pub mod compound_master_importer;
pub mod error;
pub mod file_parser;

pub use compound_master_importer::{CompoundMasterImporter, ImportSummary, RejectedRow};
pub use error::{ImportError, ImportResult};
pub use file_parser::{CsvParser, ExcelParser, FileParser, RawRecord, UniversalFileParser};
