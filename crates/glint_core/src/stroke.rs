//! Stroke descriptions

use std::sync::Arc;

/// Line cap style
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LineCap {
    #[default]
    Butt,
    Round,
    Square,
}

/// Line join style
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LineJoin {
    #[default]
    Miter,
    Round,
    Bevel,
}

/// Where the stroke sits relative to the path outline
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StrokeStyle {
    /// Entirely inside the outline
    Inner,
    /// Straddling the outline (half in, half out)
    #[default]
    Centered,
    /// Entirely outside the outline
    Outer,
}

/// A stroke description
#[derive(Clone, Debug, PartialEq)]
pub struct BasicStroke {
    pub width: f32,
    pub cap: LineCap,
    pub join: LineJoin,
    pub miter_limit: f32,
    pub style: StrokeStyle,
    /// Dash pattern (on/off lengths); empty means solid
    pub dash: Arc<[f32]>,
    pub dash_phase: f32,
}

impl Default for BasicStroke {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl BasicStroke {
    pub fn new(width: f32) -> Self {
        Self {
            width,
            cap: LineCap::Butt,
            join: LineJoin::Miter,
            miter_limit: 10.0,
            style: StrokeStyle::Centered,
            dash: Arc::from([]),
            dash_phase: 0.0,
        }
    }

    pub fn with_cap(mut self, cap: LineCap) -> Self {
        self.cap = cap;
        self
    }

    pub fn with_join(mut self, join: LineJoin) -> Self {
        self.join = join;
        self
    }

    pub fn with_style(mut self, style: StrokeStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_dash(mut self, dash: Vec<f32>, phase: f32) -> Self {
        self.dash = dash.into();
        self.dash_phase = phase;
        self
    }

    pub fn is_dashed(&self) -> bool {
        !self.dash.is_empty()
    }

    /// How far the stroke extends outward from the outline, as a fraction
    /// of the line width
    pub fn expansion_factor(&self) -> f32 {
        match self.style {
            StrokeStyle::Outer => 1.0,
            StrokeStyle::Centered => 0.5,
            StrokeStyle::Inner => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expansion_factor() {
        assert_eq!(BasicStroke::new(2.0).expansion_factor(), 0.5);
        assert_eq!(
            BasicStroke::new(2.0)
                .with_style(StrokeStyle::Outer)
                .expansion_factor(),
            1.0
        );
        assert_eq!(
            BasicStroke::new(2.0)
                .with_style(StrokeStyle::Inner)
                .expansion_factor(),
            0.0
        );
    }

    #[test]
    fn test_dash_detection() {
        assert!(!BasicStroke::new(1.0).is_dashed());
        assert!(BasicStroke::new(1.0).with_dash(vec![4.0, 2.0], 0.0).is_dashed());
    }
}
