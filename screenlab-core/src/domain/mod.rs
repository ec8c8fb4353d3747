//! Domain types for ScreenLab

pub mod indicator_set;
pub mod price;

pub use indicator_set::{
    BollingerGroup, FieldId, IndicatorSet, IndicatorValue, MacdTriple, MovingAverages,
    PriceChanges, VolumeAverages,
};
pub use price::{PriceField, PricePoint};
