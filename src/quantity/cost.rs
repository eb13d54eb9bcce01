use std::fmt::{Debug, Display, Formatter};

use crate::quantity::Quantity;

pub type Cost = Quantity<0, 0, 1>;

impl Cost {
    /// Round the cost to [mills][1].
    ///
    /// [1]: https://en.wikipedia.org/wiki/Mill_(currency)
    #[must_use]
    pub fn round_to_mills(self) -> Self {
        Self((self.0 * 1000.0).round() / 1000.0)
    }
}

impl Display for Cost {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:+.2} €", self.0)
    }
}

impl Debug for Cost {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}€", self.0)
    }
}
