// ==========================================
// 主数据集成测试
// ==========================================
// 职责: 订单删除/取消守卫、操作员维护、工艺路线替换与导入
// ==========================================


#[cfg(test)]
mod master_data_test {
    use shop_floor_tracker::api::dto::{NewOperatorRequest, NewOrderRequest, RoutingStepInput};
    use shop_floor_tracker::domain::{OrderPriority, OrderStatus, TravelSheetStatus};
    use shop_floor_tracker::importer::{CsvRoutingSource, JsonRecordSource};
    use shop_floor_tracker::repository::UnitOfWork;
    use std::io::Write;

    use crate::test_helpers::{seed_operator, seed_order, seed_routing, setup_test_env};

    // ==========================================
    // 订单
    // ==========================================

    #[test]
    fn test_register_order_rejects_duplicates_and_blanks() {
        let (_temp_file, state) = setup_test_env();
        let api = &state.master_data_api;

        let order = seed_order(&state, "MO-0100", "P-1", 10, None);
        assert_eq!(order.status, OrderStatus::Created);
        assert_eq!(order.revision, 0);
        assert_eq!(api.list_open_orders().unwrap().len(), 1);

        let err = api
            .register_order(NewOrderRequest {
                order_no: "MO-0100".to_string(),
                part_number: "P-1".to_string(),
                quantity: 5,
                due_date: None,
                priority: OrderPriority::High,
            })
            .unwrap_err();
        assert_eq!(err.error_code(), "BUSINESS_RULE_VIOLATION");

        let err = api
            .register_order(NewOrderRequest {
                order_no: "  ".to_string(),
                part_number: "P-1".to_string(),
                quantity: 5,
                due_date: None,
                priority: OrderPriority::Normal,
            })
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_INPUT");
    }

    #[test]
    fn test_delete_order_forbidden_while_sheet_references_it() {
        let (_temp_file, state) = setup_test_env();
        seed_routing(&state, "P-DEL", &[(10, "CUT", 1.0)]);
        let order = seed_order(&state, "MO-DEL", "P-DEL", 10, None);
        let sheet = state
            .shop_floor_api
            .generate_travel_sheet(&order.order_id, None)
            .unwrap();

        let err = state.master_data_api.delete_order(&order.order_id).unwrap_err();
        assert_eq!(err.error_code(), "BUSINESS_RULE_VIOLATION");

        // 作废后可删除, 已作废流转卡随订单清除
        state.shop_floor_api.cancel_travel_sheet(&sheet.sheet_id).unwrap();
        state.master_data_api.delete_order(&order.order_id).unwrap();

        let err = state.master_data_api.get_order(&order.order_id).unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");
        let uow = UnitOfWork::open(&state.db_path).unwrap();
        assert!(uow.sheets.find_by_id(&sheet.sheet_id).unwrap().is_none());
    }

    #[test]
    fn test_cancel_order_voids_unstarted_sheets() {
        let (_temp_file, state) = setup_test_env();
        seed_operator(&state, "BADGE-A", "张三");
        seed_routing(&state, "P-CAN", &[(10, "CUT", 1.0)]);

        let order = seed_order(&state, "MO-CAN-1", "P-CAN", 10, None);
        let sheet = state
            .shop_floor_api
            .generate_travel_sheet(&order.order_id, None)
            .unwrap();
        let cancelled = state.master_data_api.cancel_order(&order.order_id).unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        let voided = state.shop_floor_api.get_travel_sheet(&sheet.sheet_id).unwrap();
        assert_eq!(voided.status, TravelSheetStatus::Cancelled);

        // 已取消订单不能再取消 / 生成流转卡
        let err = state.master_data_api.cancel_order(&order.order_id).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ORDER_STATE");
        let err = state
            .shop_floor_api
            .generate_travel_sheet(&order.order_id, None)
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ORDER_STATE");

        // 已开工的订单不能取消
        let running = seed_order(&state, "MO-CAN-2", "P-CAN", 10, None);
        let sheet = state
            .shop_floor_api
            .generate_travel_sheet(&running.order_id, None)
            .unwrap();
        state
            .shop_floor_api
            .process_scan("BADGE-A", &sheet.operations[0].checkpoint_token)
            .unwrap();
        let err = state.master_data_api.cancel_order(&running.order_id).unwrap_err();
        assert_eq!(err.error_code(), "BUSINESS_RULE_VIOLATION");
    }

    // ==========================================
    // 操作员
    // ==========================================

    #[test]
    fn test_operator_badge_is_unique() {
        let (_temp_file, state) = setup_test_env();
        let first = seed_operator(&state, "BADGE-U", "王五");
        assert!(first.active);

        let err = state
            .master_data_api
            .register_operator(NewOperatorRequest {
                operator_id: None,
                badge_token: "BADGE-U".to_string(),
                display_name: "赵六".to_string(),
            })
            .unwrap_err();
        assert_eq!(err.error_code(), "BUSINESS_RULE_VIOLATION");

        let deactivated = state
            .master_data_api
            .deactivate_operator(&first.operator_id)
            .unwrap();
        assert!(!deactivated.active);

        let err = state.master_data_api.deactivate_operator("no-such").unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");
    }

    // ==========================================
    // 工艺路线
    // ==========================================

    #[test]
    fn test_replace_routing_validates_and_replaces() {
        let (_temp_file, state) = setup_test_env();
        let api = &state.master_data_api;
        let step = |seq: u32, code: &str| RoutingStepInput {
            sequence_number: seq,
            process_code: code.to_string(),
            process_name: None,
            work_center: Some("WC-1".to_string()),
            standard_time_minutes: 1.5,
        };

        assert_eq!(api.replace_routing("P-R", vec![step(20, "WELD"), step(10, "CUT")]).unwrap(), 2);
        assert_eq!(api.replace_routing("P-R", vec![step(10, "CUT")]).unwrap(), 1);

        let uow = UnitOfWork::open(&state.db_path).unwrap();
        let stored = uow.routing.find_by_part_number("P-R").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].process_name, "CUT");

        let err = api
            .replace_routing("P-R", vec![step(10, "CUT"), step(10, "WELD")])
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ROUTING");
        let err = api.replace_routing("P-R", Vec::new()).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ROUTING");

        // 失败不改动原路线
        assert_eq!(uow.routing.find_by_part_number("P-R").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_import_routing_from_csv() {
        let (_temp_file, state) = setup_test_env();

        let mut csv_file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(
            csv_file,
            "Part_Number,Sequence_Number,Process_Code,Process_Name,Work_Center,Standard_Time_Minutes"
        )
        .unwrap();
        writeln!(csv_file, "P-CSV-1,20,WELD,焊接,WC-2,2.5").unwrap();
        writeln!(csv_file, "P-CSV-1,10,CUT,下料,WC-1,1.0").unwrap();
        writeln!(csv_file, "P-CSV-2,10,PACK,,,").unwrap();
        csv_file.flush().unwrap();

        let report = state
            .master_data_api
            .import_routing(&CsvRoutingSource::new(csv_file.path()))
            .await
            .unwrap();
        assert_eq!(report.steps_imported, 3);
        assert_eq!(report.part_numbers, vec!["P-CSV-1".to_string(), "P-CSV-2".to_string()]);

        let uow = UnitOfWork::open(&state.db_path).unwrap();
        let steps = uow.routing.find_by_part_number("P-CSV-1").unwrap();
        assert_eq!(steps.iter().map(|s| s.sequence_number).collect::<Vec<_>>(), vec![10, 20]);
        let pack = uow.routing.find_by_part_number("P-CSV-2").unwrap();
        assert_eq!(pack[0].process_name, "PACK");
        assert_eq!(pack[0].standard_time_minutes, 0.0);
    }

    #[tokio::test]
    async fn test_import_rejects_whole_batch_on_invalid_row() {
        let (_temp_file, state) = setup_test_env();
        seed_routing(&state, "P-KEEP", &[(10, "CUT", 1.0)]);

        let payload = r#"[
            {"part_number": "P-KEEP", "sequence_number": 10, "process_code": "LASER"},
            {"part_number": "P-BAD", "sequence_number": 10, "process_code": "CUT"},
            {"part_number": "P-BAD", "sequence_number": 10, "process_code": "WELD"}
        ]"#;
        let err = state
            .master_data_api
            .import_routing(&JsonRecordSource::new(payload))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ROUTING");

        let uow = UnitOfWork::open(&state.db_path).unwrap();
        let kept = uow.routing.find_by_part_number("P-KEEP").unwrap();
        assert_eq!(kept[0].process_code, "CUT");
        assert!(uow.routing.find_by_part_number("P-BAD").unwrap().is_empty());
    }
}
