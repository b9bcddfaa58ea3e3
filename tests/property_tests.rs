use proptest::prelude::*;

use cvbridge::{
    cv_type, Handle, HandleTable, InvocationBatch, InvocationDispatcher, InvocationRegistry,
    InvocationRequest, Mat, Payload, Selector, Sentinel, Terminal,
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

fn dispatcher() -> InvocationDispatcher {
    InvocationDispatcher::new(
        Arc::new(InvocationRegistry::builtin()),
        Arc::new(HandleTable::new()),
    )
}

proptest! {
    #[test]
    fn test_creates_yield_distinct_handles(n in 1usize..200) {
        let table = HandleTable::new();
        let handles: Vec<Handle> = (0..n).map(|_| table.create_empty().unwrap()).collect();
        let unique: HashSet<_> = handles.iter().copied().collect();
        prop_assert_eq!(unique.len(), n);
        for h in &handles {
            prop_assert!(h.as_i32() >= 0 && h.as_i32() < 1000);
        }
    }

    #[test]
    fn test_deleted_handles_are_not_found(
        n in 1usize..50,
        picks in prop::collection::vec(any::<prop::sample::Index>(), 1..20),
    ) {
        let table = HandleTable::new();
        let handles: Vec<Handle> = (0..n).map(|_| table.create_empty().unwrap()).collect();
        let mut deleted = HashSet::new();
        for pick in picks {
            let h = handles[pick.index(n)];
            if deleted.insert(h) {
                table.delete(h).unwrap();
            }
        }
        for h in &handles {
            prop_assert_eq!(table.get(*h).is_err(), deleted.contains(h));
        }
        prop_assert_eq!(table.len(), n - deleted.len());
    }

    #[test]
    fn test_encode_then_from_array_round_trips(
        rows in prop::collection::vec(prop::collection::vec(-1000i32..1000, 3), 1..8),
    ) {
        let d = dispatcher();
        let data: Vec<Vec<f64>> = rows
            .iter()
            .map(|r| r.iter().map(|v| *v as f64).collect())
            .collect();
        let mat = Mat::from_rows(&data, cv_type::CV_32SC1).unwrap();
        let src = d.table().create(mat).unwrap();

        let payload = cvbridge::encode_mat(&d.table().get(src).unwrap(), Selector::all()).unwrap();
        prop_assert_eq!(&payload, &Payload::Nested(data));

        let copy = d
            .invoke(
                &InvocationRequest::new("fromArray")
                    .param("data", serde_json::to_value(&payload).unwrap())
                    .param("type", cv_type::CV_32SC1.code()),
            )
            .unwrap()
            .handle
            .unwrap();
        let (a, b) = (d.table().get(src).unwrap(), d.table().get(copy).unwrap());
        prop_assert_eq!(&*a, &*b);
    }

    #[test]
    fn test_unknown_functions_never_mutate(name in "[a-z]{3,12}Unknown", value in 0i32..255) {
        let d = dispatcher();
        let h = d.table().create(Mat::filled(2, 2, cv_type::CV_8UC1, 1.0)).unwrap();
        let err = d
            .invoke(&InvocationRequest::new(name).param("value", value).input(h))
            .unwrap_err();
        prop_assert!(err.is_unknown_function());
        prop_assert_eq!(d.table().handles(), vec![h]);
        let mat = d.table().get(h).unwrap();
        prop_assert_eq!(mat.data(), &[1.0; 4][..]);
    }

    #[test]
    fn test_batch_reports_last_processed_callback(
        callbacks in prop::collection::vec(prop::option::of("[a-z]{0,6}"), 1..6),
    ) {
        let d = dispatcher();
        let h = d.table().create(Mat::zeros(1, 1, cv_type::CV_8UC1)).unwrap();
        let batch: InvocationBatch = callbacks
            .iter()
            .enumerate()
            .map(|(i, cb)| {
                let req = InvocationRequest::new("setTo").param("value", json!(i)).input(h);
                match cb {
                    Some(name) => req.callback(name.clone()),
                    None => req,
                }
            })
            .collect();

        let outcome = d.invoke_batch(&batch);
        prop_assert_eq!(outcome.completed, callbacks.len());
        prop_assert_eq!(&outcome.callback, callbacks.last().unwrap());
        prop_assert_eq!(outcome.terminal, Terminal::Handle(h));
    }

    #[test]
    fn test_wire_terminal_round_trip(code in -5i32..1010) {
        let terminal = Terminal::from_wire(code);
        match terminal {
            Terminal::Handle(h) => prop_assert_eq!(h.as_i32(), code),
            Terminal::Sentinel(s) => {
                prop_assert!(code >= 1000);
                prop_assert_eq!(Sentinel::from_code(code), Some(s));
            }
            Terminal::None => prop_assert!(code < 0 || code > 1002),
        }
        if !matches!(terminal, Terminal::None) {
            prop_assert_eq!(terminal.to_wire(), code);
        }
    }
}
