// ==========================================
// 输送带胶料批次台账 - 运维入口
// ==========================================
// 用法:
//   belt-compound-ledger [db_path] [catalog_file]
// 打开/初始化台账库，可选导入胶料主数据，输出各胶料库存汇总与台账审计结果
// ==========================================

use belt_compound_ledger::app::{get_default_db_path, AppState};
use belt_compound_ledger::logging;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    let mut args = std::env::args().skip(1);
    let db_path = args
        .next()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(get_default_db_path);

    tracing::info!("==================================================");
    tracing::info!("{} v{}", belt_compound_ledger::APP_NAME, belt_compound_ledger::VERSION);
    tracing::info!("使用数据库: {}", db_path);
    tracing::info!("==================================================");

    let state = AppState::new(db_path)?;

    if let Some(catalog) = args.next() {
        let summary = state.inventory_api.import_compound_masters(&catalog)?;
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    let summaries = state.inventory_api.inventory_summaries()?;
    println!("{}", serde_json::to_string_pretty(&summaries)?);

    let report = state.inventory_api.audit_ledger()?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.is_clean() {
        std::process::exit(2);
    }
    Ok(())
}
