macro_rules! setters {
    ($($(#[$attr:meta])* $f:ident: $t:ty,)+) => {$(
        $(#[$attr])*
        #[inline]
        pub fn $f(&mut self, $f: $t) -> &mut Self {
            self.$f = $f;
            self
        }
    )+};
}
