#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use slotstore::BitMap;

#[derive(Arbitrary, Debug)]
enum Op {
    Set(u16, bool),
    Claim,
}

#[derive(Arbitrary, Debug)]
struct Input {
    capacity: u16,
    ops: Vec<Op>,
}

// Random set/claim sequences must agree with a plain Vec<bool> model
fuzz_target!(|input: Input| {
    let capacity = (input.capacity as usize % 2048) + 1;
    let map = BitMap::new(capacity);
    let mut model = vec![false; capacity];

    for op in input.ops {
        match op {
            Op::Set(i, value) => {
                let i = i as usize % capacity;
                map.set(i, value);
                model[i] = value;
            }
            Op::Claim => {
                let expected = model.iter().position(|&b| !b);
                assert_eq!(map.find_vacant_and_set(), expected);
                if let Some(i) = expected {
                    model[i] = true;
                }
            }
        }
    }

    for (i, &bit) in model.iter().enumerate() {
        assert_eq!(map.get(i), bit);
    }
});
