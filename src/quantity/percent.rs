quantity!(Percent, "%");

impl Percent {
    pub const HIGH_LOAD: Self = Self(80.0);
}
