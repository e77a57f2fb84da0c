//! Operator-forwarding macro for transparent numeric newtypes.

#[macro_export]
macro_rules! op {
    (binary $t:ty, $trait:ident, $meth:ident) => {
        impl std::ops::$trait for $t {
            type Output = Self;

            fn $meth(self, rhs: Self) -> Self::Output {
                Self(std::ops::$trait::$meth(self.0, rhs.0))
            }
        }
    };
    (inplace $t:ty, $trait:ident, $meth:ident) => {
        impl std::ops::$trait for $t {
            fn $meth(&mut self, rhs: Self) {
                std::ops::$trait::$meth(&mut self.0, rhs.0);
            }
        }
    };
    (unary $t:ty, $trait:ident, $meth:ident) => {
        impl std::ops::$trait for $t {
            type Output = Self;

            fn $meth(self) -> Self::Output {
                Self(std::ops::$trait::$meth(self.0))
            }
        }
    };
}
