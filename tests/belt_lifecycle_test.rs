// ==========================================
// 皮带生命周期集成测试
// ==========================================
// 覆盖: 创建 / 修改 / 删除的级联重算、事务回滚、API 校验
// ==========================================


#[cfg(test)]
mod belt_lifecycle_test {
    use belt_compound_ledger::api::{ApiError, CreateBeltRequest, RegisterBatchRequest, UpdateBeltRequest};
    use belt_compound_ledger::app::AppState;
    use belt_compound_ledger::domain::{Belt, CompoundRole};
    use belt_compound_ledger::engine::{BeltChanges, LedgerError, NewBelt};

    use crate::test_helpers::*;

    fn belt_request(number: &str, cover_kg: f64, cover_produced_on: &str) -> CreateBeltRequest {
        CreateBeltRequest {
            belt_number: number.to_string(),
            cover_compound_code: Some("nk5".to_string()),
            cover_kg: Some(cover_kg),
            cover_produced_on: Some(cover_produced_on.to_string()),
            ..Default::default()
        }
    }

    fn create(state: &AppState, request: CreateBeltRequest) -> Belt {
        state.belt_api.create_belt(request).unwrap().belt.unwrap()
    }

    /// nk5 03-03 手工批次 A(90kg) + B1(100kg) + B2(50kg)
    ///
    /// B1 消耗 A 全部 90kg，并自动建批 C(03-10) 消耗 10kg；B2 从 C 消耗 50kg
    fn two_belt_ledger(state: &AppState) -> (String, Belt, Belt) {
        let batch_a = state
            .inventory_api
            .register_batch(RegisterBatchRequest {
                compound_code: "nk5".to_string(),
                batch_date: "2025-03-03".to_string(),
                batches: 1,
                weight_per_batch: None,
            })
            .unwrap()
            .batch_id;
        let b1 = create(state, belt_request("B1", 100.0, "2025-03-10"));
        let b2 = create(state, belt_request("B2", 50.0, "2025-03-11"));
        (batch_a, b1, b2)
    }

    // ==========================================
    // 创建
    // ==========================================

    #[test]
    fn test_create_belt_assigns_distinct_working_days() {
        let (_tmp, state) = create_test_state();

        let result = state
            .belt_api
            .create_belt(CreateBeltRequest {
                belt_number: "EP630-001".to_string(),
                calendaring_date: Some("2025-03-12".to_string()),
                cover_compound_code: Some("nk5".to_string()),
                skim_compound_code: Some("sk2".to_string()),
                cover_kg: Some(100.0),
                skim_kg: Some(40.0),
                ..Default::default()
            })
            .unwrap();
        let belt = result.belt.unwrap();

        // 缺省期望日 = 压延日前一个工作日
        assert_eq!(belt.cover_produced_on, Some(d(2025, 3, 11)));
        assert_eq!(belt.skim_produced_on, Some(d(2025, 3, 10)));
        assert!(approx_eq(belt.required_kg(CompoundRole::Cover), 100.0));
        assert!(approx_eq(belt.required_kg(CompoundRole::Skim), 40.0));
        assert_eq!(result.generated_batch_ids.len(), 2);

        let history = state.repos.history_repo.find_belt_history(&belt.belt_id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].belt_number, "EP630-001");

        for usage in belt.batches_used(CompoundRole::Cover) {
            let batch = state.inventory_api.get_batch(&usage.batch_id).unwrap();
            assert_eq!(batch.cover_produced_on, Some(d(2025, 3, 11)));
        }
        assert_ledger_clean(&state);
    }

    #[test]
    fn test_second_belt_does_not_reuse_production_dates() {
        let (_tmp, state) = create_test_state();
        let first = create(&state, belt_request("B1", 10.0, "2025-03-10"));
        let second = create(&state, belt_request("B2", 10.0, "2025-03-10"));

        assert_eq!(first.cover_produced_on, Some(d(2025, 3, 10)));
        assert_eq!(second.cover_produced_on, Some(d(2025, 3, 11)));
    }

    #[test]
    fn test_belt_without_compounds_consumes_nothing() {
        let (_tmp, state) = create_test_state();
        let belt = create(
            &state,
            CreateBeltRequest {
                belt_number: "BARE-1".to_string(),
                ..Default::default()
            },
        );

        assert_eq!(belt.cover_produced_on, None);
        assert_eq!(belt.skim_produced_on, None);
        assert!(state.repos.batch_repo.list_all().unwrap().is_empty());
    }

    // ==========================================
    // 删除
    // ==========================================

    #[test]
    fn test_delete_cascades_to_later_belts() {
        let (_tmp, state) = create_test_state();
        let (batch_a, b1, b2) = two_belt_ledger(&state);
        assert_eq!(b1.cover_batches_used[0].batch_id, batch_a);
        assert_ne!(b2.cover_batches_used[0].batch_id, batch_a);

        let result = state.belt_api.delete_belt(&b1.belt_id).unwrap();
        assert_eq!(result.affected_belt_ids, vec![b2.belt_id.clone()]);
        assert!(result.belt.is_none());

        let b2_after = state.belt_api.get_belt(&b2.belt_id).unwrap();
        assert_eq!(b2_after.cover_batches_used.len(), 1);
        assert_eq!(b2_after.cover_batches_used[0].batch_id, batch_a);
        assert!(approx_eq(b2_after.required_kg(CompoundRole::Cover), 50.0));

        assert!(approx_eq(remaining_for(&state, "nk5"), total_for(&state, "nk5") - 50.0));
        assert!(matches!(
            state.belt_api.get_belt(&b1.belt_id),
            Err(ApiError::NotFound(_))
        ));
        assert_ledger_clean(&state);
    }

    #[test]
    fn test_delete_belt_with_unrelated_compound_leaves_others_alone() {
        let (_tmp, state) = create_test_state();
        let b1 = create(
            &state,
            CreateBeltRequest {
                belt_number: "S1".to_string(),
                skim_compound_code: Some("sk2".to_string()),
                skim_kg: Some(30.0),
                ..Default::default()
            },
        );
        let b2 = create(&state, belt_request("B2", 40.0, "2025-03-20"));
        let before = b2.cover_batches_used.clone();

        let result = state.belt_api.delete_belt(&b1.belt_id).unwrap();
        assert!(result.affected_belt_ids.is_empty());
        assert_eq!(state.belt_api.get_belt(&b2.belt_id).unwrap().cover_batches_used, before);
        assert!(approx_eq(remaining_for(&state, "sk2"), total_for(&state, "sk2")));
        assert_ledger_clean(&state);
    }

    #[test]
    fn test_delete_missing_belt_is_not_found() {
        let (_tmp, state) = create_test_state();
        let err = state.belt_api.delete_belt("no-such-belt").unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    // ==========================================
    // 修改
    // ==========================================

    #[test]
    fn test_update_requirement_replays_later_belts() {
        let (_tmp, state) = create_test_state();
        let (batch_a, b1, b2) = two_belt_ledger(&state);

        let result = state
            .belt_api
            .update_belt(
                &b1.belt_id,
                UpdateBeltRequest {
                    cover_kg: Some(20.0),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(result.recomputed);
        assert_eq!(result.affected_belt_ids, vec![b2.belt_id.clone()]);

        let b1_after = result.belt.unwrap();
        assert_eq!(b1_after.cover_batches_used.len(), 1);
        assert_eq!(b1_after.cover_batches_used[0].batch_id, batch_a);
        assert!(approx_eq(b1_after.cover_batches_used[0].consumed_kg, 20.0));

        // B2 回到最早批次 A
        let b2_after = state.belt_api.get_belt(&b2.belt_id).unwrap();
        assert_eq!(b2_after.cover_batches_used[0].batch_id, batch_a);
        assert!(approx_eq(b2_after.required_kg(CompoundRole::Cover), 50.0));

        let a = state.inventory_api.get_batch(&batch_a).unwrap();
        assert!(approx_eq(a.inventory_remaining, 20.0));
        assert!(approx_eq(remaining_for(&state, "nk5"), total_for(&state, "nk5") - 70.0));
        assert_ledger_clean(&state);
    }

    #[test]
    fn test_metadata_only_update_skips_recompute() {
        let (_tmp, state) = create_test_state();
        let (_, b1, b2) = two_belt_ledger(&state);

        let result = state
            .belt_api
            .update_belt(
                &b1.belt_id,
                UpdateBeltRequest {
                    belt_number: Some("B1-改".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(!result.recomputed);
        assert!(result.affected_belt_ids.is_empty());

        let b1_after = result.belt.unwrap();
        assert_eq!(b1_after.belt_number, "B1-改");
        assert_eq!(b1_after.cover_batches_used, b1.cover_batches_used);
        assert_eq!(b1_after.cover_produced_on, b1.cover_produced_on);
        assert_eq!(
            state.belt_api.get_belt(&b2.belt_id).unwrap().cover_batches_used,
            b2.cover_batches_used
        );
    }

    #[test]
    fn test_compound_change_releases_old_and_consumes_new() {
        let (_tmp, state) = create_test_state();
        let (batch_a, b1, b2) = two_belt_ledger(&state);

        let result = state
            .belt_api
            .update_belt(
                &b1.belt_id,
                UpdateBeltRequest {
                    cover_compound_code: Some("cv1".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(result.affected_belt_ids, vec![b2.belt_id.clone()]);

        let b1_after = result.belt.unwrap();
        assert_eq!(b1_after.cover_compound_code.as_deref(), Some("cv1"));
        assert!(approx_eq(b1_after.required_kg(CompoundRole::Cover), 100.0));
        for usage in &b1_after.cover_batches_used {
            let batch = state.inventory_api.get_batch(&usage.batch_id).unwrap();
            assert_eq!(batch.compound_code, "cv1");
        }

        let b2_after = state.belt_api.get_belt(&b2.belt_id).unwrap();
        assert_eq!(b2_after.cover_batches_used[0].batch_id, batch_a);
        assert!(approx_eq(remaining_for(&state, "nk5"), total_for(&state, "nk5") - 50.0));
        assert_ledger_clean(&state);
    }

    #[test]
    fn test_clearing_compound_releases_inventory() {
        let (_tmp, state) = create_test_state();
        let (_, b1, _) = two_belt_ledger(&state);

        let result = state
            .belt_api
            .update_belt(
                &b1.belt_id,
                UpdateBeltRequest {
                    cover_compound_code: Some(String::new()),
                    ..Default::default()
                },
            )
            .unwrap();
        let b1_after = result.belt.unwrap();
        assert_eq!(b1_after.cover_compound_code, None);
        assert_eq!(b1_after.cover_produced_on, None);
        assert!(b1_after.cover_batches_used.is_empty());
        assert!(approx_eq(remaining_for(&state, "nk5"), total_for(&state, "nk5") - 50.0));
        assert_ledger_clean(&state);
    }

    #[test]
    fn test_failed_cascade_rolls_back_everything() {
        let (_tmp, state) = create_test_state();
        let (_, b1, b2) = two_belt_ledger(&state);
        let batches_before = state.repos.batch_repo.list_all().unwrap();

        // 绕过 API 校验，直接让编排器在级联中途失败
        let err = state
            .orchestrator
            .update_belt(
                &b1.belt_id,
                BeltChanges {
                    cover_compound_code: Some(Some("ghost".to_string())),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { .. }));

        let batches_after = state.repos.batch_repo.list_all().unwrap();
        assert_eq!(batches_after.len(), batches_before.len());
        for (before, after) in batches_before.iter().zip(batches_after.iter()) {
            assert_eq!(before.batch_id, after.batch_id);
            assert!(approx_eq(before.inventory_remaining, after.inventory_remaining));
        }

        let b1_after = state.belt_api.get_belt(&b1.belt_id).unwrap();
        assert_eq!(b1_after.cover_compound_code.as_deref(), Some("nk5"));
        assert_eq!(b1_after.cover_batches_used, b1.cover_batches_used);
        assert_eq!(
            state.belt_api.get_belt(&b2.belt_id).unwrap().cover_batches_used,
            b2.cover_batches_used
        );
        assert_ledger_clean(&state);

        // 回滚后连接仍可继续写入
        create(&state, belt_request("B3", 5.0, "2025-03-20"));
        assert_ledger_clean(&state);
    }

    #[test]
    fn test_orchestrator_rejects_bad_demand_before_mutation() {
        let (_tmp, state) = create_test_state();
        let (_, b1, b2) = two_belt_ledger(&state);
        let batches_before = state.repos.batch_repo.list_all().unwrap();

        let bad_creates = vec![
            NewBelt {
                belt_number: "NEG".to_string(),
                cover_compound_code: Some("nk5".to_string()),
                cover_kg: -50.0,
                ..Default::default()
            },
            NewBelt {
                belt_number: "ZERO".to_string(),
                cover_compound_code: Some("nk5".to_string()),
                cover_kg: 0.0,
                ..Default::default()
            },
            NewBelt {
                belt_number: "NAN".to_string(),
                cover_compound_code: Some("nk5".to_string()),
                cover_kg: f64::NAN,
                ..Default::default()
            },
            NewBelt {
                belt_number: "NOCODE".to_string(),
                cover_compound_code: Some("nk5".to_string()),
                cover_kg: 10.0,
                skim_kg: 80.0,
                ..Default::default()
            },
        ];
        for input in bad_creates {
            let number = input.belt_number.clone();
            let err = state.orchestrator.create_belt(input).unwrap_err();
            assert!(
                matches!(err, LedgerError::Validation(_)),
                "皮带 {} 应被拒绝为 Validation，实际 {:?}",
                number,
                err
            );
        }

        let bad_updates = vec![
            BeltChanges {
                cover_kg: Some(-10.0),
                ..Default::default()
            },
            BeltChanges {
                cover_kg: Some(0.0),
                ..Default::default()
            },
            BeltChanges {
                skim_kg: Some(80.0),
                ..Default::default()
            },
            BeltChanges {
                skim_compound_code: Some(Some("sk2".to_string())),
                ..Default::default()
            },
        ];
        for changes in bad_updates {
            let err = state.orchestrator.update_belt(&b1.belt_id, changes).unwrap_err();
            assert!(matches!(err, LedgerError::Validation(_)), "实际 {:?}", err);
        }

        assert_eq!(state.belt_api.list_belts().unwrap().len(), 2);
        let b1_after = state.belt_api.get_belt(&b1.belt_id).unwrap();
        assert_eq!(b1_after.cover_batches_used, b1.cover_batches_used);
        assert_eq!(
            state.belt_api.get_belt(&b2.belt_id).unwrap().cover_batches_used,
            b2.cover_batches_used
        );
        let batches_after = state.repos.batch_repo.list_all().unwrap();
        assert_eq!(batches_after.len(), batches_before.len());
        for (before, after) in batches_before.iter().zip(batches_after.iter()) {
            assert!(approx_eq(before.inventory_remaining, after.inventory_remaining));
        }
        assert_ledger_clean(&state);
    }

    // ==========================================
    // API 校验
    // ==========================================

    #[test]
    fn test_create_rejects_invalid_requests() {
        let (_tmp, state) = create_test_state();

        let cases = vec![
            CreateBeltRequest {
                belt_number: "X1".to_string(),
                cover_compound_code: Some("nk5".to_string()),
                ..Default::default()
            },
            CreateBeltRequest {
                belt_number: "X2".to_string(),
                cover_compound_code: Some("ghost".to_string()),
                cover_kg: Some(10.0),
                ..Default::default()
            },
            CreateBeltRequest {
                belt_number: "X3".to_string(),
                skim_kg: Some(10.0),
                ..Default::default()
            },
            CreateBeltRequest {
                belt_number: "X4".to_string(),
                cover_compound_code: Some("nk5".to_string()),
                cover_kg: Some(-5.0),
                ..Default::default()
            },
            CreateBeltRequest {
                belt_number: "X5".to_string(),
                cover_compound_code: Some("nk5".to_string()),
                cover_kg: Some(10.0),
                cover_produced_on: Some("2025/03/10".to_string()),
                ..Default::default()
            },
            CreateBeltRequest {
                belt_number: "  ".to_string(),
                ..Default::default()
            },
        ];

        for request in cases {
            let number = request.belt_number.clone();
            let err = state.belt_api.create_belt(request).unwrap_err();
            assert!(
                matches!(err, ApiError::InvalidInput(_)),
                "皮带 {:?} 应被拒绝为 InvalidInput，实际 {:?}",
                number,
                err
            );
        }

        assert!(state.belt_api.list_belts().unwrap().is_empty());
        assert!(state.repos.batch_repo.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_update_adding_compound_requires_kg() {
        let (_tmp, state) = create_test_state();
        let belt = create(&state, belt_request("B1", 10.0, "2025-03-10"));

        let err = state
            .belt_api
            .update_belt(
                &belt.belt_id,
                UpdateBeltRequest {
                    skim_compound_code: Some("sk2".to_string()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));

        let result = state
            .belt_api
            .update_belt(
                &belt.belt_id,
                UpdateBeltRequest {
                    skim_compound_code: Some("sk2".to_string()),
                    skim_kg: Some(25.0),
                    ..Default::default()
                },
            )
            .unwrap();
        let updated = result.belt.unwrap();
        assert!(updated.skim_produced_on.is_some());
        assert_ne!(updated.skim_produced_on, updated.cover_produced_on);
        assert!(approx_eq(updated.required_kg(CompoundRole::Skim), 25.0));
        assert_ledger_clean(&state);
    }
}
