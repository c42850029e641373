//! Property tests for the buffer laws.

use proptest::prelude::*;
use schc_core::{Buffer, Padding};

fn buffer_strategy() -> impl Strategy<Value = Buffer> {
    (
        prop::collection::vec(any::<u8>(), 0..32),
        0usize..256,
        prop_oneof![Just(Padding::Left), Just(Padding::Right)],
    )
        .prop_map(|(content, length, padding)| {
            let length = length.min(8 * content.len());
            Buffer::new(&content, length, padding).unwrap()
        })
}

fn bits_of(buffer: &Buffer) -> Vec<u8> {
    (0..buffer.len())
        .map(|i| buffer.bit_at(i as isize).unwrap())
        .collect()
}

proptest! {
    #[test]
    fn prop_concat_slices_back(a in buffer_strategy(), b in buffer_strategy()) {
        let joined = a.concat(&b);
        prop_assert_eq!(joined.len(), a.len() + b.len());
        prop_assert_eq!(joined.slice(0, a.len() as isize).unwrap(), a.clone());
        prop_assert_eq!(
            joined.slice(a.len() as isize, (a.len() + b.len()) as isize).unwrap(),
            b
        );
    }

    #[test]
    fn prop_pad_cycle_is_identity(buffer in buffer_strategy()) {
        let cycled = buffer.pad(Padding::Left).pad(Padding::Right).pad(Padding::Left);
        prop_assert_eq!(&cycled, &buffer);
        // padding changes never touch the meaningful bits
        prop_assert_eq!(bits_of(&cycled), bits_of(&buffer));
    }

    #[test]
    fn prop_shift_round_trip_keeps_surviving_bits(
        buffer in buffer_strategy(),
        shift in 0usize..64,
    ) {
        let shift = shift.min(buffer.len());
        let recovered = buffer.shift(shift as isize).shift(-(shift as isize));
        // bits not shifted off survive, the rest are zeroed
        let original = bits_of(&buffer);
        let result = bits_of(&recovered);
        prop_assert_eq!(result.len(), original.len());
        for (i, (orig, got)) in original.iter().zip(&result).enumerate() {
            if i < buffer.len() - shift {
                prop_assert_eq!(orig, got);
            } else {
                prop_assert_eq!(*got, 0);
            }
        }
    }

    #[test]
    fn prop_chunks_reassemble(buffer in buffer_strategy(), n in 1usize..24) {
        let mut reassembled = Buffer::empty(Padding::Left);
        for chunk in buffer.chunks(n) {
            prop_assert!(chunk.len() <= n);
            reassembled = reassembled.concat(&chunk);
        }
        prop_assert_eq!(reassembled, buffer);
    }

    #[test]
    fn prop_content_round_trips(buffer in buffer_strategy()) {
        let rebuilt = Buffer::new(&buffer.content(), buffer.len(), buffer.padding()).unwrap();
        prop_assert_eq!(rebuilt, buffer);
    }

    #[test]
    fn prop_equality_ignores_padding_side(buffer in buffer_strategy()) {
        prop_assert_eq!(buffer.pad(Padding::Left), buffer.pad(Padding::Right));
    }
}
