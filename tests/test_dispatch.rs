//! Dispatcher and batch behaviour through the public bridge.

use std::sync::Arc;

use cvbridge::{
    cv_type, Bridge, Error, InvocationBatch, InvocationRequest, Payload, RecordingEmitter, Scalar,
    Selector, Sentinel, Terminal,
};
use serde_json::{json, Map};

fn bridge_with_events() -> (Bridge, Arc<RecordingEmitter>) {
    let events = Arc::new(RecordingEmitter::new());
    let bridge = Bridge::builder()
        .emitter(events.clone())
        .build()
        .expect("bridge should build");
    (bridge, events)
}

#[test]
fn test_four_by_four_of_seven() {
    let bridge = Bridge::new().unwrap();
    let info = bridge
        .mat_with_scalar(4, 4, cv_type::CV_8UC1.code(), Scalar::all(7.0))
        .expect("create");
    let data = bridge
        .get_mat_data(info.mat_index, Selector::all())
        .expect("get");
    assert_eq!(data, Payload::Nested(vec![vec![7.0; 4]; 4]));
    assert_eq!(
        serde_json::to_value(&data).unwrap(),
        json!([[7.0, 7.0, 7.0, 7.0], [7.0, 7.0, 7.0, 7.0], [7.0, 7.0, 7.0, 7.0], [7.0, 7.0, 7.0, 7.0]])
    );
}

#[test]
fn test_nonexistent_function() {
    let bridge = Bridge::new().unwrap();
    let h = bridge.mat_with_params(2, 2, 0).unwrap().mat_index;
    let before = bridge.get_mat_data(h, Selector::all()).unwrap();

    let err = bridge
        .invoke(&InvocationRequest::new("nonexistent"))
        .expect_err("unknown function must fail");
    assert!(
        matches!(err, Error::UnknownFunction(ref name) if name == "nonexistent"),
        "got {:?}",
        err
    );
    assert_eq!(err.code(), "ENOSYS");
    assert_eq!(bridge.table().handles(), vec![h]);
    assert_eq!(bridge.get_mat_data(h, Selector::all()).unwrap(), before);
}

#[test]
fn test_only_final_callback_fires() {
    let (bridge, events) = bridge_with_events();
    for i in 0..7 {
        bridge
            .mat_with_scalar(1, 2, cv_type::CV_64FC1.code(), Scalar::all(i as f64))
            .unwrap();
    }

    let batch = InvocationBatch::from_json(
        r#"{"invokeGroup": [
            {"function": "transpose", "inputHandle": 0, "outputHandle": 5, "callback": ""},
            {"function": "transpose", "inputHandle": 1, "outputHandle": 6, "callback": "onDone"}
        ]}"#,
    )
    .expect("batch should parse");
    let outcome = bridge.invoke_methods(&batch);
    assert_eq!(outcome.completed, 2);
    assert_eq!(outcome.terminal.to_wire(), 6);

    let fired = events.take();
    assert_eq!(fired.len(), 1, "exactly one event expected, got {:?}", fired);
    assert_eq!(fired[0].name, "onDone");
    assert_eq!(
        fired[0].response.payload,
        Payload::Nested(vec![vec![1.0], vec![1.0]]),
        "payload should be the object at handle 6"
    );
    // The first request still ran.
    assert_eq!(
        bridge
            .get_mat_data(cvbridge::Handle::new(5).unwrap(), Selector::all())
            .unwrap(),
        Payload::Nested(vec![vec![0.0], vec![0.0]])
    );
}

#[test]
fn test_empty_final_callback_suppresses_delivery() {
    let (bridge, events) = bridge_with_events();
    let h = bridge.mat_with_params(2, 2, 0).unwrap().mat_index;
    let batch: InvocationBatch = vec![
        InvocationRequest::new("countNonZero").input(h).callback("first"),
        InvocationRequest::new("countNonZero").input(h),
    ]
    .into_iter()
    .collect();
    bridge.invoke_methods(&batch);
    assert!(events.events().is_empty(), "last request had no callback");
}

#[test]
fn test_failure_mid_batch_keeps_earlier_effects() {
    let (bridge, events) = bridge_with_events();
    let h = bridge.mat_with_params(2, 2, 0).unwrap().mat_index;
    let batch: InvocationBatch = vec![
        InvocationRequest::new("setTo").param("value", 3).input(h),
        InvocationRequest::new("threshold")
            .param("thresh", "high")
            .param("maxval", 255)
            .input(h)
            .callback("never"),
        InvocationRequest::new("setTo").param("value", 8).input(h).callback("late"),
    ]
    .into_iter()
    .collect();

    let outcome = bridge.invoke_methods(&batch);
    assert_eq!(outcome.completed, 1);
    assert_eq!(outcome.terminal, Terminal::Sentinel(Sentinel::Access));
    assert_eq!(outcome.terminal.to_wire(), 1001);
    assert_eq!(outcome.callback.as_deref(), Some("never"));
    assert!(events.events().is_empty());
    assert_eq!(
        bridge.get_mat_data(h, Selector::at(0, 0)).unwrap(),
        Payload::Flat(vec![3.0])
    );
}

#[test]
fn test_native_failure_maps_to_invocation_target() {
    let (bridge, _events) = bridge_with_events();
    let a = bridge.mat_with_params(2, 2, 0).unwrap().mat_index;
    let b = bridge.mat_with_params(3, 3, 0).unwrap().mat_index;
    let outcome = bridge.invoke_in_out_method(
        Some(a),
        "add",
        json!({"other": {"matIndex": b.as_i32()}})
            .as_object()
            .cloned()
            .unwrap(),
        None,
    );
    assert_eq!(outcome.terminal.to_wire(), 1002);
}

#[test]
fn test_round_trip_through_from_array() {
    let bridge = Bridge::new().unwrap();
    let src = bridge
        .invoke(
            &InvocationRequest::new("fromArray")
                .param("data", json!([[1, 2, 3], [4, 5, 6]]))
                .param("type", cv_type::CV_32SC1.code()),
        )
        .unwrap()
        .handle
        .unwrap();

    let payload = bridge.get_mat_data(src, Selector::all()).unwrap();
    let copy = bridge
        .invoke(
            &InvocationRequest::new("fromArray")
                .param("data", serde_json::to_value(&payload).unwrap())
                .param("type", cv_type::CV_32SC1.code()),
        )
        .unwrap()
        .handle
        .unwrap();

    assert_ne!(src, copy);
    assert_eq!(
        *bridge.table().get(src).unwrap(),
        *bridge.table().get(copy).unwrap()
    );
}

#[test]
fn test_mat_parameter_forms() {
    let bridge = Bridge::new().unwrap();
    let a = bridge.mat_with_scalar(1, 3, 6, Scalar::all(5.0)).unwrap().mat_index;
    let b = bridge.mat_with_scalar(1, 3, 6, Scalar::all(2.0)).unwrap().mat_index;

    let bare = bridge
        .invoke(&InvocationRequest::new("subtract").param("other", b.as_i32()).input(a))
        .unwrap();
    let wrapped = bridge
        .invoke(
            &InvocationRequest::new("subtract")
                .param("other", json!({"matIndex": b.as_i32()}))
                .input(a),
        )
        .unwrap();
    assert_eq!(
        *bridge.table().get(bare.handle.unwrap()).unwrap(),
        *bridge.table().get(wrapped.handle.unwrap()).unwrap()
    );

    let err = bridge
        .invoke(&InvocationRequest::new("subtract").param("other", 77).input(a))
        .unwrap_err();
    assert!(err.is_not_found(), "got {:?}", err);
}

#[test]
fn test_parameter_errors_name_the_parameter() {
    let bridge = Bridge::new().unwrap();
    let err = bridge
        .invoke(&InvocationRequest::new("zeros").param("rows", 2))
        .unwrap_err();
    assert!(err.is_invalid_parameter());
    assert!(err.to_string().contains("cols"), "message: {}", err);

    let err = bridge
        .invoke(
            &InvocationRequest::new("zeros")
                .param("rows", 1)
                .param("cols", 1)
                .param("depth", 3),
        )
        .unwrap_err();
    assert!(err.is_invalid_parameter());
}

#[test]
fn test_callback_payload_uses_direct_result() {
    let (bridge, events) = bridge_with_events();
    let h = bridge
        .mat_with_scalar(2, 2, cv_type::CV_8UC3.code(), Scalar([1.0, 2.0, 3.0, 0.0]))
        .unwrap()
        .mat_index;
    bridge.invoke_method_with_callback(Some(h), "sumElems", Map::new(), None, "sums");
    let fired = events.take();
    assert_eq!(fired.len(), 1);
    assert_eq!(
        fired[0].response.payload,
        Payload::Flat(vec![4.0, 8.0, 12.0])
    );
}

#[test]
fn test_far_away_geometry_is_clipped() {
    let (bridge, events) = bridge_with_events();
    let h = bridge.mat_with_params(4, 4, 0).unwrap().mat_index;
    let batch: InvocationBatch = vec![
        InvocationRequest::new("line")
            .param("pt1", json!({"x": -1e300, "y": 0}))
            .param("pt2", json!({"x": 1e300, "y": 0}))
            .param("color", 255)
            .input(h),
        InvocationRequest::new("circle")
            .param("center", json!({"x": 1e300, "y": -1e300}))
            .param("radius", i32::MAX)
            .param("color", 9)
            .param("thickness", -1)
            .input(h)
            .callback("drawn"),
    ]
    .into_iter()
    .collect();

    let outcome = bridge.invoke_methods(&batch);
    assert_eq!(outcome.completed, 2);
    assert_eq!(outcome.terminal, Terminal::Handle(h));
    let fired = events.take();
    assert_eq!(fired.len(), 1);
    assert_eq!(
        fired[0].response.payload,
        Payload::Nested(vec![
            vec![255.0; 4],
            vec![0.0; 4],
            vec![0.0; 4],
            vec![0.0; 4]
        ])
    );
}

#[test]
fn test_out_of_range_geometry_reports_access() {
    let (bridge, _events) = bridge_with_events();
    let h = bridge.mat_with_params(4, 4, 0).unwrap().mat_index;
    let outcome = bridge.invoke_in_out_method(
        Some(h),
        "line",
        json!({"pt1": {"x": 0, "y": 0}, "pt2": {"x": 3, "y": 3}, "color": 1, "thickness": 1_000_000})
            .as_object()
            .cloned()
            .unwrap(),
        None,
    );
    assert_eq!(outcome.terminal, Terminal::Sentinel(Sentinel::Access));
    assert_eq!(
        bridge.get_mat_data(h, Selector::all()).unwrap(),
        Payload::Nested(vec![vec![0.0; 4]; 4])
    );
}

#[test]
fn test_oversized_objects_are_rejected() {
    let (bridge, _events) = bridge_with_events();
    let outcome = bridge.invoke_methods_json(
        r#"[{"function": "zeros", "params": {"rows": 2147483647, "cols": 2147483647, "type": 30}}]"#,
    );
    assert_eq!(outcome.completed, 0);
    assert_eq!(outcome.terminal.to_wire(), 1001);
    assert!(bridge.table().is_empty());

    let err = bridge
        .mat_with_params(usize::MAX, 2, cv_type::CV_8UC1.code())
        .unwrap_err();
    assert!(err.is_invalid_parameter(), "got {:?}", err);
    let err = bridge
        .mat_with_scalar(1 << 20, 1 << 20, cv_type::CV_8UC3.code(), Scalar::all(1.0))
        .unwrap_err();
    assert!(err.is_invalid_parameter(), "got {:?}", err);
    assert!(bridge.table().is_empty());
}
