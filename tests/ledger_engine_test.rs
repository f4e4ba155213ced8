// ==========================================
// 台账引擎集成测试
// ==========================================
// 覆盖: FIFO 消耗、自动建批、冲回逆运算、错误分类
// 入口: InventoryApi::consume / revert（经写闸门）
// ==========================================


#[cfg(test)]
mod ledger_engine_test {
    use belt_compound_ledger::api::{ApiError, RegisterBatchRequest};
    use belt_compound_ledger::config::config_keys;
    use belt_compound_ledger::domain::{total_consumed, BatchUsage, CompoundRole};
    use belt_compound_ledger::engine::ConsumptionRequest;
    use std::collections::HashMap;

    use crate::test_helpers::*;

    fn register(state: &belt_compound_ledger::app::AppState, code: &str, date: &str, batches: u32) -> String {
        state
            .inventory_api
            .register_batch(RegisterBatchRequest {
                compound_code: code.to_string(),
                batch_date: date.to_string(),
                batches,
                weight_per_batch: None,
            })
            .unwrap()
            .batch_id
    }

    fn remaining_by_batch(state: &belt_compound_ledger::app::AppState) -> HashMap<String, f64> {
        state
            .repos
            .batch_repo
            .list_all()
            .unwrap()
            .into_iter()
            .map(|b| (b.batch_id, b.inventory_remaining))
            .collect()
    }

    // ==========================================
    // 自动建批
    // ==========================================

    #[test]
    fn test_nk5_auto_creates_enough_batches() {
        let (_tmp, state) = create_test_state();

        let outcome = state
            .inventory_api
            .consume(&ConsumptionRequest::new("nk5", 200.0, d(2025, 3, 3)))
            .unwrap();

        assert!(approx_eq(outcome.total_kg(), 200.0));
        assert!(!outcome.generated_batch_ids.is_empty());

        let batches = state.inventory_api.list_batches("nk5").unwrap();
        let created: f64 = batches.iter().map(|b| f64::from(b.batches) * 90.0).sum();
        assert!(created >= 200.0);
        assert_eq!(batches[0].batch_date, d(2025, 3, 3));
        assert_eq!(batches[0].batches, 3);
        assert!(approx_eq(batches[0].inventory_remaining, 70.0));
        assert_batch_invariants(&state);
    }

    #[test]
    fn test_auto_batch_skips_day_taken_by_other_compound() {
        let (_tmp, state) = create_test_state();
        register(&state, "sk2", "2025-03-03", 1);

        state
            .inventory_api
            .consume(&ConsumptionRequest::new("nk5", 50.0, d(2025, 3, 3)))
            .unwrap();

        let batches = state.inventory_api.list_batches("nk5").unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].batch_date, d(2025, 3, 4));
    }

    #[test]
    fn test_auto_batch_snaps_off_sunday_and_holiday() {
        let (_tmp, state) = create_test_state();

        // 2025-03-09 是周日
        state
            .inventory_api
            .consume(&ConsumptionRequest::new("nk5", 10.0, d(2025, 3, 9)))
            .unwrap();
        // 2025-03-14 是默认节假日
        state
            .inventory_api
            .consume(&ConsumptionRequest::new("sk2", 60.0, d(2025, 3, 14)))
            .unwrap();

        assert_eq!(state.inventory_api.list_batches("nk5").unwrap()[0].batch_date, d(2025, 3, 10));
        assert_eq!(state.inventory_api.list_batches("sk2").unwrap()[0].batch_date, d(2025, 3, 15));
    }

    #[test]
    fn test_generation_cap_reports_capacity_exhausted() {
        belt_compound_ledger::logging::init_test();
        let (_tmp, db_path) = create_test_db().unwrap();
        set_config(
            &db_path,
            &[
                (config_keys::BATCH_COUNT_MAX, "1"),
                (config_keys::MAX_GENERATED_BATCHES, "2"),
            ],
        );
        let state = open_state(&db_path);
        seed_catalog(&state);

        let err = state
            .inventory_api
            .consume(&ConsumptionRequest::new("nk5", 1000.0, d(2025, 3, 3)))
            .unwrap_err();
        assert!(matches!(err, ApiError::CapacityExhausted(_)));
    }

    // ==========================================
    // FIFO
    // ==========================================

    #[test]
    fn test_fifo_drains_in_date_order() {
        let (_tmp, state) = create_test_state();
        let b5 = register(&state, "nk5", "2025-03-05", 1);
        let b3 = register(&state, "nk5", "2025-03-03", 1);
        let b4 = register(&state, "nk5", "2025-03-04", 1);

        let first = state
            .inventory_api
            .consume(&ConsumptionRequest::new("nk5", 100.0, d(2025, 3, 3)))
            .unwrap();
        assert_eq!(
            first.batches_used,
            vec![BatchUsage::new(b3.clone(), 90.0), BatchUsage::new(b4.clone(), 10.0)]
        );

        let second = state
            .inventory_api
            .consume(&ConsumptionRequest::new("nk5", 100.0, d(2025, 3, 3)))
            .unwrap();
        assert_eq!(second.batches_used[0].batch_id, b4);
        assert!(approx_eq(second.batches_used[0].consumed_kg, 80.0));
        assert_eq!(second.batches_used[1].batch_id, b5);
        assert!(approx_eq(second.batches_used[1].consumed_kg, 20.0));
        assert!(second.generated_batch_ids.is_empty());
        assert_batch_invariants(&state);
    }

    #[test]
    fn test_sequential_consumption_never_skips_earlier_stock() {
        let (_tmp, state) = create_test_state();

        let mut last_date = None;
        for _ in 0..12 {
            let outcome = state
                .inventory_api
                .consume(&ConsumptionRequest::new("nk5", 37.5, d(2025, 3, 3)))
                .unwrap();
            assert!(approx_eq(outcome.total_kg(), 37.5));

            for usage in &outcome.batches_used {
                let batch = state.inventory_api.get_batch(&usage.batch_id).unwrap();
                if let Some(prev) = last_date {
                    assert!(batch.batch_date >= prev, "FIFO 顺序被破坏");
                }
                last_date = Some(batch.batch_date);
            }
        }

        // 除最后一个批次外，其余批次都应耗尽
        let batches = state.inventory_api.list_batches("nk5").unwrap();
        let active: Vec<_> = batches.iter().filter(|b| b.inventory_remaining > 1e-6).collect();
        assert!(active.len() <= 1);
        assert_batch_invariants(&state);
    }

    // ==========================================
    // 生产日期写入
    // ==========================================

    #[test]
    fn test_produced_on_stamped_once_per_role() {
        let (_tmp, state) = create_test_state();
        let batch_id = register(&state, "nk5", "2025-03-03", 2);

        state
            .inventory_api
            .consume(&ConsumptionRequest::new("nk5", 10.0, d(2025, 3, 3)).for_role(CompoundRole::Cover, d(2025, 3, 6)))
            .unwrap();
        state
            .inventory_api
            .consume(&ConsumptionRequest::new("nk5", 10.0, d(2025, 3, 3)).for_role(CompoundRole::Cover, d(2025, 3, 7)))
            .unwrap();
        state
            .inventory_api
            .consume(&ConsumptionRequest::new("nk5", 10.0, d(2025, 3, 3)).for_role(CompoundRole::Skim, d(2025, 3, 8)))
            .unwrap();

        let batch = state.inventory_api.get_batch(&batch_id).unwrap();
        assert_eq!(batch.cover_produced_on, Some(d(2025, 3, 6)));
        assert_eq!(batch.skim_produced_on, Some(d(2025, 3, 8)));

        let history = state.repos.history_repo.find_batch_history(&batch_id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].cover_produced_on, Some(d(2025, 3, 6)));
    }

    // ==========================================
    // 冲回
    // ==========================================

    #[test]
    fn test_revert_restores_remaining_exactly() {
        let (_tmp, state) = create_test_state();
        register(&state, "nk5", "2025-03-03", 1);
        register(&state, "nk5", "2025-03-04", 1);
        state
            .inventory_api
            .consume(&ConsumptionRequest::new("nk5", 30.0, d(2025, 3, 3)))
            .unwrap();

        let before = remaining_by_batch(&state);
        let outcome = state
            .inventory_api
            .consume(&ConsumptionRequest::new("nk5", 120.0, d(2025, 3, 3)))
            .unwrap();
        assert!(approx_eq(total_consumed(&outcome.batches_used), 120.0));

        state.inventory_api.revert(&outcome.batches_used).unwrap();
        let after = remaining_by_batch(&state);
        for (batch_id, remaining) in &before {
            assert!(approx_eq(after[batch_id], *remaining), "批次 {} 冲回后库存不一致", batch_id);
        }
        assert_batch_invariants(&state);
    }

    #[test]
    fn test_revert_missing_batch_is_not_found() {
        let (_tmp, state) = create_test_state();
        let err = state
            .inventory_api
            .revert(&[BatchUsage::new("no-such-batch", 5.0)])
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn test_revert_more_than_consumed_is_invariant_error() {
        let (_tmp, state) = create_test_state();
        let batch_id = register(&state, "nk5", "2025-03-03", 1);
        state
            .inventory_api
            .consume(&ConsumptionRequest::new("nk5", 10.0, d(2025, 3, 3)))
            .unwrap();

        let err = state
            .inventory_api
            .revert(&[BatchUsage::new(batch_id, 50.0)])
            .unwrap_err();
        assert!(matches!(err, ApiError::InternalError(_)));
        assert_batch_invariants(&state);
    }

    // ==========================================
    // 错误分类
    // ==========================================

    #[test]
    fn test_missing_master_is_not_found() {
        let (_tmp, state) = create_test_state();
        let err = state
            .inventory_api
            .consume(&ConsumptionRequest::new("ghost", 10.0, d(2025, 3, 3)))
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(ref msg) if msg.starts_with("CompoundMaster")));
    }

    #[test]
    fn test_negative_requirement_is_validation_error() {
        let (_tmp, state) = create_test_state();
        let err = state
            .inventory_api
            .consume(&ConsumptionRequest::new("nk5", -1.0, d(2025, 3, 3)))
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));
        assert!(state.inventory_api.list_batches("nk5").unwrap().is_empty());
    }

    #[test]
    fn test_register_batch_rejects_taken_day_and_sunday() {
        let (_tmp, state) = create_test_state();
        register(&state, "nk5", "2025-03-03", 1);

        let taken = state.inventory_api.register_batch(RegisterBatchRequest {
            compound_code: "sk2".to_string(),
            batch_date: "2025-03-03".to_string(),
            batches: 1,
            weight_per_batch: None,
        });
        assert!(taken.is_err());

        let sunday = state.inventory_api.register_batch(RegisterBatchRequest {
            compound_code: "sk2".to_string(),
            batch_date: "2025-03-09".to_string(),
            batches: 1,
            weight_per_batch: Some(40.0),
        });
        assert!(sunday.is_err());
    }
}
