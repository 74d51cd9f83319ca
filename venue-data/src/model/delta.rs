use venue_instrument::Side;

/// A single absolute-quantity change at a price level. `quantity == 0.0` semantically
/// removes the level.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct L2Delta {
    pub side: Side,
    pub price: f64,
    pub quantity: f64,
}

impl L2Delta {
    pub fn new(side: Side, price: f64, quantity: f64) -> Self {
        Self {
            side,
            price,
            quantity,
        }
    }

    pub fn is_removal(&self) -> bool {
        self.quantity == 0.0
    }
}
