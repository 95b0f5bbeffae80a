//! FNV-1 incremental hashing.
//!
//! Structural keys are hashed with this accumulator instead of `std::hash`
//! so that values are order-sensitive and identical across processes.
//! Each 32-bit input is folded one byte at a time, lowest byte first.

/// Initial value of every FNV accumulator.
pub const FNV_OFFSET: u32 = 2_166_136_261;

/// Multiplier applied after each folded byte.
pub const FNV_PRIME: u32 = 16_777_619;

/// Folded for absent items in [`hash_all`].
const ABSENT_ITEM: i32 = 1337;

/// Added to every present item in [`hash_all`] so that small item hashes
/// (zero in particular) still move the accumulator.
const ITEM_SALT: i32 = 1_928_529_265;

/// An FNV-1 accumulator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fnv(u32);

impl Default for Fnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Fnv {
    /// Start a new accumulator at [`FNV_OFFSET`].
    #[inline]
    pub const fn new() -> Self {
        Fnv(FNV_OFFSET)
    }

    /// Start an accumulator from an arbitrary seed.
    #[inline]
    pub const fn with_seed(seed: u32) -> Self {
        Fnv(seed)
    }

    #[inline]
    fn step(&mut self, bits: u32) {
        self.0 ^= bits;
        self.0 = self.0.wrapping_mul(FNV_PRIME);
    }

    /// Fold a single byte.
    #[inline]
    pub fn mix_byte(&mut self, byte: u8) {
        self.step(u32::from(byte));
    }

    /// Fold a signed 32-bit value.
    ///
    /// The top byte is taken with an arithmetic shift, so negative values
    /// fold their sign extension into the last step.
    #[inline]
    pub fn mix(&mut self, value: i32) {
        let [b0, b1, b2, _] = value.to_le_bytes();
        self.step(u32::from(b0));
        self.step(u32::from(b1));
        self.step(u32::from(b2));
        self.step(u32::from_ne_bytes((value >> 24).to_ne_bytes()));
    }

    /// Fold an unsigned 32-bit value by reinterpreting its bits.
    #[inline]
    pub fn mix_u32(&mut self, value: u32) {
        self.mix(i32::from_ne_bytes(value.to_ne_bytes()));
    }

    /// Fold a 64-bit value as its low half followed by its high half.
    #[inline]
    pub fn mix_u64(&mut self, value: u64) {
        let [l0, l1, l2, l3, h0, h1, h2, h3] = value.to_le_bytes();
        self.mix_u32(u32::from_le_bytes([l0, l1, l2, l3]));
        self.mix_u32(u32::from_le_bytes([h0, h1, h2, h3]));
    }

    /// Current accumulator value.
    #[inline]
    pub const fn finish(self) -> u32 {
        self.0
    }
}

/// Hash an ordered sequence of item hashes.
///
/// `None` stands for an absent item. The accumulator starts at zero rather
/// than [`FNV_OFFSET`].
pub fn hash_all<I>(items: I) -> u32
where
    I: IntoIterator<Item = Option<u32>>,
{
    let mut acc = Fnv::with_seed(0);
    for item in items {
        match item {
            None => acc.mix(ABSENT_ITEM),
            Some(hash) => {
                let salted = i32::from_ne_bytes(hash.to_ne_bytes()).wrapping_add(ITEM_SALT);
                acc.mix(salted);
            }
        }
    }
    acc.finish()
}
