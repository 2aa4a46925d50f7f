#![no_main]

use libfuzzer_sys::arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use observable_ptr::{Observable, Observer};

const OWNERS: usize = 4;
const OBSERVERS: usize = 8;

#[derive(Arbitrary, Debug)]
enum Action {
    Assign(u8, i32),
    Reset(u8),
    Swap(u8, u8),
    Take(u8, u8),
    Attach(u8, u8),
    CloneFrom(u8, u8),
    Detach(u8),
    Read(u8),
}

#[derive(Default)]
struct Model {
    next_id: u64,
    owners: [Option<(u64, i32)>; OWNERS],
    observers: [Option<u64>; OBSERVERS],
}

impl Model {
    fn release(&mut self, owner: usize) {
        if let Some((id, _)) = self.owners[owner].take() {
            for observer in self.observers.iter_mut() {
                if *observer == Some(id) {
                    *observer = None;
                }
            }
        }
    }

    fn value_of(&self, id: u64) -> Option<i32> {
        self.owners.iter().flatten().find(|(i, _)| *i == id).map(|&(_, v)| v)
    }
}

fuzz_target!(|data: Vec<Action>| {
    let mut owners: Vec<Observable<i32>> = (0..OWNERS).map(|_| Observable::empty()).collect();
    let mut observers: Vec<Observer<i32>> = (0..OBSERVERS).map(|_| Observer::new()).collect();
    let mut model = Model::default();

    for action in data {
        match action {
            Action::Assign(o, v) => {
                let o = o as usize % OWNERS;
                owners[o].assign_value(v);
                model.release(o);
                model.owners[o] = Some((model.next_id, v));
                model.next_id += 1;
            }
            Action::Reset(o) => {
                let o = o as usize % OWNERS;
                owners[o].reset();
                model.release(o);
            }
            Action::Swap(a, b) => {
                let (a, b) = (a as usize % OWNERS, b as usize % OWNERS);
                if a != b {
                    let mut taken = owners[a].take();
                    taken.swap(&mut owners[b]);
                    owners[a] = taken;
                    model.owners.swap(a, b);
                }
            }
            Action::Take(a, b) => {
                let (a, b) = (a as usize % OWNERS, b as usize % OWNERS);
                if a != b {
                    owners[a] = owners[b].take();
                    model.release(a);
                    model.owners[a] = model.owners[b].take();
                }
            }
            Action::Attach(w, o) => {
                let (w, o) = (w as usize % OBSERVERS, o as usize % OWNERS);
                observers[w].attach(&owners[o]);
                model.observers[w] = model.owners[o].map(|(id, _)| id);
            }
            Action::CloneFrom(a, b) => {
                let (a, b) = (a as usize % OBSERVERS, b as usize % OBSERVERS);
                if a != b {
                    let source = observers[b].clone();
                    observers[a].clone_from(&source);
                    model.observers[a] = model.observers[b];
                }
            }
            Action::Detach(w) => {
                let w = w as usize % OBSERVERS;
                observers[w].detach();
                model.observers[w] = None;
            }
            Action::Read(w) => {
                let w = w as usize % OBSERVERS;
                let expected = model.observers[w].and_then(|id| model.value_of(id));
                assert_eq!(observers[w].with(|v| *v), expected);
            }
        }

        for (w, observer) in observers.iter().enumerate() {
            assert_eq!(observer.is_valid(), model.observers[w].is_some());
        }
        for (o, owner) in owners.iter().enumerate() {
            let expected = match model.owners[o] {
                Some((id, _)) => model.observers.iter().filter(|w| **w == Some(id)).count(),
                None => 0,
            };
            assert_eq!(owner.observer_count(), expected);
            assert_eq!(owner.get().copied(), model.owners[o].map(|(_, v)| v));
        }
    }
});
