//! End-to-end property protocol tests: growth past inline capacity,
//! type flips, prototype walks, extensibility and constant rejection,
//! and name stability across allocations.

use marten_vm_core::{Function, PropAttrs, Tag, Value, VmContext};

#[test]
fn growth_beyond_inline_capacity() {
    let ctx = VmContext::new();
    let obj = ctx.new_obj(Value::null(), 8).unwrap();

    for i in 0..20 {
        assert!(ctx.set_prop(obj, &format!("p{i}"), Value::int32(i)).unwrap());
        // Every value written so far survives each extension rebuild.
        for j in 0..=i {
            assert_eq!(ctx.get_prop(obj, &format!("p{j}")).as_int32(), Some(j));
        }
    }

    let inst = ctx.instance(obj);
    let ext = inst.next().expect("20 properties cannot fit 8 inline slots");
    // __proto__ plus 20 properties: 21 slots used.
    assert!(inst.cap() + ext.cap() > 20);
    assert_eq!(ctx.get_prop(obj, "p0").as_int32(), Some(0));
    assert_eq!(ctx.get_prop(obj, "p19").as_int32(), Some(19));
}

#[test]
fn type_flip_preserves_slot_and_counts() {
    let ctx = VmContext::new();
    let obj = ctx.new_obj(Value::null(), 0).unwrap();

    assert!(ctx.set_prop(obj, "x", Value::int32(1)).unwrap());
    let first_shape = ctx.get_shape(obj);
    let first_slot = first_shape.get_def_shape(&ctx, "x").unwrap().slot_idx();

    let hi = Value::new(0, Tag::String);
    assert!(ctx.set_prop(obj, "x", hi).unwrap());
    let second_shape = ctx.get_shape(obj);
    let second_slot = second_shape.get_def_shape(&ctx, "x").unwrap().slot_idx();

    assert_eq!(ctx.get_prop(obj, "x").tag(), Tag::String);
    assert_ne!(first_shape.idx(), second_shape.idx());
    assert_eq!(first_slot, second_slot);
    assert_eq!(ctx.stats().num_shape_flips(), 1);
    assert_eq!(ctx.stats().num_shape_flips_global(), 0);
}

#[test]
fn flip_back_reinterns_the_original_shape() {
    let ctx = VmContext::new();
    let obj = ctx.new_obj(Value::null(), 0).unwrap();

    ctx.set_prop(obj, "x", Value::int32(1)).unwrap();
    let original = ctx.get_shape(obj).idx();

    ctx.set_prop(obj, "x", Value::new(0, Tag::String)).unwrap();
    assert_ne!(ctx.get_shape(obj).idx(), original);

    // Flipping back lands on the interned original, not a fresh fork.
    ctx.set_prop(obj, "x", Value::int32(2)).unwrap();
    assert_eq!(ctx.get_shape(obj).idx(), original);
    assert_eq!(ctx.stats().num_shape_flips(), 2);
}

#[test]
fn global_object_flips_are_attributed() {
    let ctx = VmContext::new();
    let global = ctx.new_obj(Value::null(), 0).unwrap();
    ctx.set_global(global);

    ctx.set_prop(global, "x", Value::int32(1)).unwrap();
    ctx.set_prop(global, "x", Value::new(0, Tag::String)).unwrap();
    assert_eq!(ctx.stats().num_shape_flips(), 1);
    assert_eq!(ctx.stats().num_shape_flips_global(), 1);
}

#[test]
fn prototype_walk() {
    let ctx = VmContext::new();
    let proto = ctx.new_obj(Value::null(), 0).unwrap();
    ctx.set_prop(proto, "k", Value::int32(42)).unwrap();

    let obj = ctx.new_obj(proto, 0).unwrap();
    assert_eq!(ctx.get_prop(obj, "k").as_int32(), Some(42));

    // An own write shadows the prototype without touching it.
    ctx.set_prop(obj, "k", Value::int32(7)).unwrap();
    assert_eq!(ctx.get_prop(obj, "k").as_int32(), Some(7));
    assert_eq!(ctx.get_prop(proto, "k").as_int32(), Some(42));
}

#[test]
fn deep_prototype_chain() {
    let ctx = VmContext::new();
    let mut proto = Value::null();
    for i in 0..64 {
        let obj = ctx.new_obj(proto, 0).unwrap();
        ctx.set_prop(obj, &format!("p{i}"), Value::int32(i)).unwrap();
        proto = obj;
    }
    let leaf = ctx.new_obj(proto, 0).unwrap();
    assert_eq!(ctx.get_prop(leaf, "p0").as_int32(), Some(0));
    assert_eq!(ctx.get_prop(leaf, "p63").as_int32(), Some(63));
    assert!(ctx.get_prop(leaf, "p64").is_undef());
}

#[test]
fn non_extensible_object_rejects_new_properties() {
    let ctx = VmContext::new();
    let obj = ctx.new_obj(Value::null(), 0).unwrap();
    ctx.set_prop(obj, "a", Value::int32(1)).unwrap();

    let def = ctx.get_shape(obj).get_def_shape(&ctx, "a").unwrap();
    let sealed = PropAttrs::DEFAULT.difference(PropAttrs::EXTENSIBLE);
    ctx.set_prop_attrs(obj, &def, sealed);

    assert!(!ctx.set_prop(obj, "new", Value::int32(1)).unwrap());
    assert!(ctx.get_prop(obj, "new").is_undef());
    // Existing properties stay live and writable.
    assert!(ctx.set_prop(obj, "a", Value::int32(2)).unwrap());
    assert_eq!(ctx.get_prop(obj, "a").as_int32(), Some(2));
}

#[test]
fn const_redefinition_rejected() {
    let ctx = VmContext::new();
    let obj = ctx.new_obj(Value::null(), 0).unwrap();

    assert!(ctx.def_const(obj, "PI", Value::int32(3), false).unwrap());
    assert!(!ctx.set_prop(obj, "PI", Value::int32(4)).unwrap());
    assert_eq!(ctx.get_prop(obj, "PI").as_int32(), Some(3));

    // A second constant under the same name is also rejected.
    assert!(!ctx.def_const(obj, "PI", Value::int32(4), false).unwrap());
    assert_eq!(ctx.get_prop(obj, "PI").as_int32(), Some(3));
}

#[test]
fn closures_and_arrays_use_the_same_protocol() {
    let ctx = VmContext::new();
    let clos = ctx
        .new_clos(Value::null(), 0, Function::new("f", 1))
        .unwrap();
    let arr = ctx.new_arr(Value::null(), 3).unwrap();

    assert!(ctx.set_prop(clos, "tag", Value::int32(1)).unwrap());
    assert!(ctx.set_prop(arr, "tag", Value::int32(2)).unwrap());
    assert_eq!(ctx.get_prop(clos, "tag").as_int32(), Some(1));
    assert_eq!(ctx.get_prop(arr, "tag").as_int32(), Some(2));

    // Reserved slots are untouched by ordinary properties.
    assert_eq!(ctx.get_arr_len(arr), 3);
    assert_eq!(&*ctx.fun_at(ctx.get_fun_ptr(clos)).name, "f");
}

#[test]
fn name_stability_across_allocations() {
    let ctx = VmContext::new();
    let obj = ctx.new_obj(Value::null(), 0).unwrap();

    // The property name lives in a transient buffer that dies right
    // after the write.
    {
        let transient = format!("{}{}", "dyn", 7);
        ctx.set_prop(obj, &transient, Value::int32(99)).unwrap();
    }

    // Interleave allocations (each one is a safepoint).
    let before = ctx.heap().safepoints();
    for _ in 0..10 {
        ctx.new_obj(Value::null(), 0).unwrap();
    }
    assert!(ctx.heap().safepoints() > before);

    // A fresh copy of the same characters still finds the value.
    let copy = String::from("dyn7");
    assert_eq!(ctx.get_prop(obj, &copy).as_int32(), Some(99));
}
