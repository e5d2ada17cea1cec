//! Handle objects on top of a shared pool:
//!
//! * `OwnedHandle` destroys its value when dropped.
//! * `SparseHandle` is a weak, cloneable reference that notices when its value is gone.
//! * Values that own handles to other values of the same pool, forming a hierarchy.

use sparse_pool::{LocalSparsePool, OwnedHandle};

struct Node {
    name: String,
    children: Vec<OwnedHandle<Node>>,
}

fn node(
    pool: &LocalSparsePool<Node>,
    name: &str,
    children: Vec<OwnedHandle<Node>>,
) -> OwnedHandle<Node> {
    pool.create(Node {
        name: name.to_string(),
        children,
    })
}

fn main() {
    let pool = LocalSparsePool::new();

    let wheel = node(&pool, "wheel", Vec::new());
    let wheel_ref = wheel.as_handle();

    let axle = node(&pool, "axle", vec![wheel, node(&pool, "wheel", Vec::new())]);
    let car = node(&pool, "car", vec![axle, node(&pool, "engine", Vec::new())]);

    println!("Pool holds {} nodes", pool.len());
    println!("Weak handle sees: {}", wheel_ref.borrow().name);

    // Detaching the axle while mutating the car drops the axle and, with it, both wheels.
    // Other values of the pool cannot be borrowed in here, but they can be dropped.
    pool.with_mut(&car.as_handle(), |car| {
        println!("Detaching the axle from the {}", car.name);
        drop(car.children.remove(0));
    })
    .unwrap();

    println!("Pool holds {} nodes after removing the axle", pool.len());
    println!("Weak handle still live: {}", wheel_ref.is_live());

    // A new node may reuse the raw handle value of the removed wheel, but the weak handle
    // remembers which value it was issued for.
    let spare = node(&pool, "spare wheel", Vec::new());
    println!(
        "Spare reuses the raw handle: {}, old weak handle live: {}",
        spare.value() == wheel_ref.value(),
        wheel_ref.is_live()
    );

    // Handing ownership to a weak handle keeps the value around until destroyed explicitly.
    let mut spare = spare.release();
    println!("Spare still live after release: {}", spare.is_live());
    spare.destroy();

    drop(car);
    println!("Pool is empty: {}", pool.is_empty());
}
