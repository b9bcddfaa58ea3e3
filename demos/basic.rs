//! Basic example driving the bridge the way a scripting runtime would.
//!
//! Run with: cargo run --example basic

use std::sync::Arc;

use cvbridge::{
    cv_type, Bridge, BridgeConfig, ChannelEmitter, InvocationBatch, Point, Scalar, Selector,
};

fn main() -> cvbridge::Result<()> {
    let config = BridgeConfig::default();
    cvbridge::init_with_config(&config)?;

    println!("API Version: {}", cvbridge::api_version());

    let (emitter, events) = ChannelEmitter::new();
    let bridge = Bridge::builder()
        .config(config)
        .emitter(Arc::new(emitter))
        .build()?;
    println!("Registered functions: {}", bridge.registry().names().join(", "));

    println!("\n--- Creating objects ---");
    let canvas = bridge.mat_with_scalar(8, 8, cv_type::CV_8UC3.code(), Scalar::all(0.0))?;
    let gray = bridge.mat()?;
    println!(
        "canvas: {}x{} at handle {}",
        canvas.rows, canvas.cols, canvas.mat_index
    );

    bridge.draw_line(
        canvas.mat_index,
        Point { x: 0.0, y: 0.0 },
        Point { x: 7.0, y: 7.0 },
        Scalar([0.0, 0.0, 255.0, 0.0]),
        1,
    )?;
    bridge.cvt_color(canvas.mat_index, gray.mat_index, 6)?;
    println!(
        "gray diagonal: {:?}",
        bridge.get_mat_data(gray.mat_index, Selector::row(3))?
    );

    println!("\n--- Running a batch ---");
    let batch = InvocationBatch::from_json(&format!(
        r#"{{"invokeGroup": [
            {{"function": "threshold", "params": {{"thresh": 10, "maxval": 1}},
              "inputHandle": {gray}, "outputHandle": {gray}}},
            {{"function": "countNonZero", "inputHandle": {gray}, "callback": "onCount"}}
        ]}}"#,
        gray = gray.mat_index.as_i32()
    ))?;
    let outcome = bridge.invoke_methods(&batch);
    println!("completed {} request(s)", outcome.completed);

    for event in events.try_iter() {
        println!("event {}: {:?}", event.name, event.response.payload);
    }

    println!("\n--- Failing batch ---");
    let outcome = bridge.invoke_methods_json(r#"[{"function": "nonexistent", "callback": "never"}]"#);
    println!("terminal code: {}", outcome.terminal.to_wire());

    bridge.shutdown();
    Ok(())
}
