/// Tests for the `locals()` view over frame slots.
mod common;

use std::{cell::Cell, rc::Rc};

use common::{counting_key_class, expect_exc, int};
use pretty_assertions::assert_eq;
use yieldpoint::{
    Class, ClosureCell, ExcType, ExecContext, Frame, FrameDescriptor, HashingStorage, LocalsStorage, ProfilingTracer,
    RecordingTracer, SimpleException, SlotIdentifier, Str, TraceEvent, Value,
};

/// Slots: `x`, `.0`, `<ret>`, `y`, `z` (a cell) and an internal slot.
/// `y` is left unbound.
fn sample_frame() -> Frame {
    let descriptor = FrameDescriptor::new([
        SlotIdentifier::from("x"),
        SlotIdentifier::from(".0"),
        SlotIdentifier::from("<ret>"),
        SlotIdentifier::from("y"),
        SlotIdentifier::from("z"),
        SlotIdentifier::Internal("state"),
    ]);
    let frame = Frame::new(descriptor);
    frame.store(0, Value::Int(1));
    frame.store(1, Value::Int(2));
    frame.store(2, Value::Int(3));
    frame.store_raw(4, Value::Cell(ClosureCell::new(Value::Int(5))));
    frame.store(5, Value::Int(6));
    frame
}

fn keys(storage: &HashingStorage) -> Vec<String> {
    storage.keys().map(|key| key.py_repr()).collect()
}

fn view(frame: &Frame) -> HashingStorage {
    HashingStorage::from(LocalsStorage::new(frame.clone()))
}

/// Only bound, user-visible slots are entries, and cells are read through.
#[test]
fn visible_entries() {
    let mut ctx = ExecContext::new();
    let frame = sample_frame();
    let storage = view(&frame);

    assert!(storage.is_locals());
    assert_eq!(storage.len(), 2);
    assert_eq!(keys(&storage), ["'x'", "'z'"]);
    assert_eq!(int(&storage.get_str(&mut ctx, &Str::new("z")).unwrap().unwrap()), 5);
    for hidden in [".0", "<ret>", "y", "state"] {
        assert!(storage.get_str(&mut ctx, &Str::new(hidden)).unwrap().is_none(), "{hidden}");
    }
    assert!(!storage.has_side_effect());

    let pairs = storage
        .for_each(Vec::new(), |mut pairs, key, value| {
            pairs.push(format!("{}={}", key.py_repr(), value.py_repr()));
            Ok(pairs)
        })
        .unwrap();
    assert_eq!(pairs, ["'x'=1", "'z'=5"]);
}

/// Keys iterate in slot order from both ends.
#[test]
fn keys_from_both_ends() {
    let frame = sample_frame();
    frame.store(3, Value::Int(4));
    let storage = view(&frame);

    let forward = keys(&storage);
    let mut reversed: Vec<String> = storage.keys().rev().map(|key| key.py_repr()).collect();
    assert_eq!(reversed, ["'z'", "'y'", "'x'"]);
    reversed.reverse();
    assert_eq!(reversed, forward);

    let mut both = storage.keys();
    assert_eq!(both.next().unwrap().py_repr(), "'x'");
    assert_eq!(both.next_back().unwrap().py_repr(), "'z'");
    assert_eq!(both.next().unwrap().py_repr(), "'y'");
    assert!(both.next_back().is_none());
    assert!(both.next().is_none());
}

/// Reads see later stores to the frame. The length is counted once per view;
/// a copy is a fresh view and recounts.
#[test]
fn view_is_live() {
    let mut ctx = ExecContext::new();
    let frame = sample_frame();
    let storage = view(&frame);
    assert_eq!(storage.len(), 2);

    frame.store(3, Value::str("late"));
    frame.store(0, Value::Int(100));
    let y = storage.get_item(&mut ctx, &Value::str("y"), None).unwrap().unwrap();
    assert_eq!(y.as_str(), Some("late"));
    assert_eq!(int(&storage.get_str(&mut ctx, &Str::new("x")).unwrap().unwrap()), 100);
    assert_eq!(keys(&storage), ["'x'", "'y'", "'z'"]);
    assert_eq!(storage.len(), 2);

    let copy = storage.copy();
    assert!(copy.is_locals());
    assert_eq!(copy.len(), 3);

    // a second, independent view over the same frame sees the same bindings
    let other = view(&frame);
    frame.store(3, Value::Int(8));
    let collect = |storage: &HashingStorage| {
        storage
            .for_each(Vec::new(), |mut pairs, key, value| {
                pairs.push(format!("{}={}", key.py_repr(), value.py_repr()));
                Ok(pairs)
            })
            .unwrap()
    };
    assert_eq!(collect(&other), ["'x'=100", "'y'=8", "'z'=5"]);
    assert_eq!(collect(&storage), collect(&other));

    // writes through a cell are visible too
    if let Value::Cell(cell) = frame.load_raw(4) {
        cell.set(Value::Int(50));
    }
    assert_eq!(int(&copy.get_str(&mut ctx, &Str::new("z")).unwrap().unwrap()), 50);
}

/// The first write snapshots the view into a map; the frame is untouched.
#[test]
fn write_promotes_to_map() {
    let mut ctx = ExecContext::new();
    let frame = sample_frame();
    let mut storage = view(&frame);

    assert!(storage.set_item(&mut ctx, Value::str("w"), Value::Int(9)).unwrap().is_none());
    assert!(!storage.is_locals());
    assert_eq!(keys(&storage), ["'x'", "'z'", "'w'"]);
    assert!(frame.descriptor().find_slot("w").is_none());

    let old = storage.set_item(&mut ctx, Value::str("x"), Value::Int(7)).unwrap();
    assert_eq!(old.as_ref().map(int), Some(1));
    assert_eq!(int(&frame.load(0).unwrap()), 1);

    // the snapshot no longer follows the frame
    frame.store(3, Value::Int(4));
    assert!(storage.get_str(&mut ctx, &Str::new("y")).unwrap().is_none());
}

/// Removing a bound key promotes; removing a missing one keeps the view.
#[test]
fn pop_and_clear() {
    let mut ctx = ExecContext::new();
    let frame = sample_frame();

    let mut storage = view(&frame);
    assert!(storage.pop(&mut ctx, &Value::str("y")).unwrap().is_none());
    assert!(storage.is_locals());

    let removed = storage.pop(&mut ctx, &Value::str("x")).unwrap();
    assert_eq!(removed.as_ref().map(int), Some(1));
    assert!(!storage.is_locals());
    assert_eq!(keys(&storage), ["'z'"]);
    assert_eq!(int(&frame.load(0).unwrap()), 1);

    let mut cleared = view(&frame);
    cleared.clear();
    assert!(!cleared.is_locals());
    assert!(cleared.is_empty());
    assert_eq!(frame.locals().len(), 2);
}

/// Class whose instances hash like the string `"x"`. `__eq__` compares the
/// payload with the other operand's text.
fn alias_class() -> Rc<Class> {
    Rc::new(
        Class::new("Alias")
            .with_hash(|_, _| Ok(Str::new("x").py_hash()))
            .with_eq(|_, instance, other| Ok(other.as_str().is_some() && other.as_str() == instance.payload().as_str())),
    )
}

/// Non-string keys are matched by hash, then by `__eq__` against slot names.
#[test]
fn non_string_keys_scan_slot_names() {
    let mut ctx = ExecContext::new();
    let storage = view(&sample_frame());
    let alias = alias_class();

    let found = storage
        .get_item(&mut ctx, &Value::instance(&alias, Value::str("x")), None)
        .unwrap();
    assert_eq!(found.as_ref().map(int), Some(1));
    let wrong_text = Value::instance(&alias, Value::str("q"));
    assert!(storage.get_item(&mut ctx, &wrong_text, None).unwrap().is_none());

    assert!(storage.get_item(&mut ctx, &Value::Int(1), None).unwrap().is_none());
    assert!(storage.get_item(&mut ctx, &Value::None, None).unwrap().is_none());
}

/// `__eq__` is only consulted for slot names whose hash matches the key's.
#[test]
fn scan_compares_on_hash_match_only() {
    let mut ctx = ExecContext::new();
    let storage = view(&sample_frame());
    let eq_calls = Rc::new(Cell::new(0));
    let class = counting_key_class(Rc::clone(&eq_calls));

    let unrelated = Value::instance(&class, Value::Int(12_345));
    assert!(storage.get_item(&mut ctx, &unrelated, None).unwrap().is_none());
    assert_eq!(eq_calls.get(), 0);

    let same_hash_as_z = Value::instance(&class, Value::Int(Str::new("z").py_hash().cast_signed()));
    assert!(storage.get_item(&mut ctx, &same_hash_as_z, None).unwrap().is_none());
    assert_eq!(eq_calls.get(), 1);

    // hidden slot names are never compared
    let same_hash_as_hidden = Value::instance(&class, Value::Int(Str::new(".0").py_hash().cast_signed()));
    assert!(storage.get_item(&mut ctx, &same_hash_as_hidden, None).unwrap().is_none());
    assert_eq!(eq_calls.get(), 1);
}

/// An exception from `__eq__` during the scan propagates.
#[test]
fn scan_eq_exception_propagates() {
    let mut ctx = ExecContext::new();
    let storage = view(&sample_frame());
    let class = Rc::new(
        Class::new("Bad")
            .with_hash(|_, _| Ok(Str::new("x").py_hash()))
            .with_eq(|_, _, _| Err(SimpleException::new_msg(ExcType::ValueError, "boom").into())),
    );
    let err = storage
        .get_item(&mut ctx, &Value::instance(&class, Value::None), None)
        .unwrap_err();
    assert_eq!(expect_exc(&err, ExcType::ValueError), "boom");
}

/// The slot cache answers repeated lookups of the same key object and gives
/// the same answers as a scan.
#[test]
fn cached_lookups_match_scans() {
    let mut ctx = ExecContext::new().with_tracer(RecordingTracer::new());
    let frame = sample_frame();
    let storage = view(&frame);
    let x = Str::new("x");
    let y = Str::new("y");

    let first = storage.get_str(&mut ctx, &x).unwrap();
    let second = storage.get_str(&mut ctx, &x).unwrap();
    let scanned = storage.get_item(&mut ctx, &Value::str("x"), None).unwrap();
    assert_eq!(first.as_ref().map(int), Some(1));
    assert_eq!(second.as_ref().map(int), Some(1));
    assert_eq!(scanned.as_ref().map(int), Some(1));

    // a cached miss still sees a later binding
    assert!(storage.get_str(&mut ctx, &y).unwrap().is_none());
    frame.store(3, Value::Int(4));
    assert_eq!(storage.get_str(&mut ctx, &y).unwrap().as_ref().map(int), Some(4));

    let hits: Vec<bool> = ctx
        .tracer_as::<RecordingTracer>()
        .unwrap()
        .events()
        .iter()
        .filter_map(|event| match event {
            TraceEvent::LocalsLookup { cache_hit } => Some(*cache_hit),
            _ => None,
        })
        .collect();
    assert_eq!(hits, [false, true, false, false, true]);
}

/// The profiling report counts cache hits and misses.
#[test]
fn profiling_counts_cache_use() {
    let mut ctx = ExecContext::new().with_tracer(ProfilingTracer::new());
    let storage = view(&sample_frame());
    let keys: Vec<Str> = ["x", "z", ".0", "y"].into_iter().map(Str::new).collect();
    for _ in 0..3 {
        for key in &keys {
            storage.get_str(&mut ctx, key).unwrap();
        }
    }
    let report = ctx.tracer_as::<ProfilingTracer>().unwrap().report();
    // three keys fit in the cache, the fourth always misses
    assert_eq!(report.cache_misses, 3 + 3);
    assert_eq!(report.cache_hits, 3 * 2);
}

/// `frame.locals()` wraps a view; writing through the dict leaves the frame alone.
#[test]
fn frame_locals_dict() {
    let mut ctx = ExecContext::new();
    let frame = sample_frame();
    let mut dict = frame.locals();
    assert_eq!(dict.py_repr().unwrap(), "{'x': 1, 'z': 5}");
    assert!(dict.storage().is_locals());

    dict.set_item(&mut ctx, Value::str("x"), Value::Int(2)).unwrap();
    assert!(!dict.storage().is_locals());
    assert_eq!(int(&frame.load(0).unwrap()), 1);
    assert_eq!(frame.locals().py_repr().unwrap(), "{'x': 1, 'z': 5}");

    let display = view(&frame).to_string();
    assert!(display.starts_with("locals(size=2, frame="), "{display}");
}
