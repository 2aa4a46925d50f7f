use core::cell::Cell;

use observable_ptr::{Observable, Observer};
use rand::{rngs::SmallRng, Rng, SeedableRng};

fn main() {
    let start = std::time::Instant::now();

    let mut rng = SmallRng::seed_from_u64(21345);
    let owners_len = 1_000;
    let observers_len = 100_000;

    let mut owners: Vec<_> = (0..owners_len).map(|_| Observable::new(Cell::new(0))).collect();
    let mut observers: Vec<Observer<Cell<i32>>> = (0..observers_len)
        .map(|_| owners[rng.gen_range(0..owners_len)].observe())
        .collect();
    let t1 = start.elapsed().as_millis();

    let mut live = 0;
    for _ in 0..10_000_000 {
        let i = rng.gen_range(0..observers_len);
        match rng.gen_range(0..100) {
            0 => owners[rng.gen_range(0..owners_len)].assign_value(Cell::new(0)),
            1..=9 => observers[i].attach(&owners[rng.gen_range(0..owners_len)]),
            10..=14 => {
                let j = rng.gen_range(0..observers_len);
                if i != j {
                    let source = observers[j].clone();
                    observers[i].clone_from(&source);
                }
            }
            _ => {
                if let Some(value) = observers[i].try_borrow() {
                    value.set(value.get() + 1);
                    live += 1;
                }
            }
        }
    }

    let attached: usize = owners.iter().map(Observable::observer_count).sum();
    println!("{live}, {attached}, {t1}, {}", start.elapsed().as_millis());
}
