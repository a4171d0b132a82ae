//! Planar geometry shared by the layout solvers and the record model.
//!
//! Coordinates are millimetres on the PCB side and schematic units on the
//! schematic side; nothing in this module cares which. `y` grows upward.

use serde::{Deserialize, Serialize};

/// A point (or vector) in the plane.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Point::new(self.x + dx, self.y + dy)
    }

    pub fn sub(self, other: Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }

    pub fn add(self, other: Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }

    /// Rotates this vector counter-clockwise about the origin.
    pub fn rotate(self, degrees: f64) -> Point {
        Transform::rotation(degrees).apply(self)
    }

    pub fn distance(self, other: Point) -> f64 {
        let d = self.sub(other);
        (d.x * d.x + d.y * d.y).sqrt()
    }
}

/// Width and height of an axis-aligned box.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Size { width, height }
    }

    /// Swaps width and height for quarter-turn rotations.
    pub fn rotated(self, degrees: f64) -> Size {
        if is_quarter_turn(degrees) {
            Size::new(self.height, self.width)
        } else {
            self
        }
    }

    pub fn area(self) -> f64 {
        self.width * self.height
    }
}

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Bounds {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn from_center(center: Point, size: Size) -> Self {
        Bounds::new(
            center.x - size.width / 2.0,
            center.y - size.height / 2.0,
            center.x + size.width / 2.0,
            center.y + size.height / 2.0,
        )
    }

    pub fn from_point(p: Point) -> Self {
        Bounds::new(p.x, p.y, p.x, p.y)
    }

    /// Smallest box covering every box in `iter`, or `None` if empty.
    pub fn union_all<I: IntoIterator<Item = Bounds>>(iter: I) -> Option<Bounds> {
        iter.into_iter().reduce(|a, b| a.union(&b))
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn size(&self) -> Size {
        Size::new(self.width(), self.height())
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Bounds {
        Bounds::new(
            self.min_x + dx,
            self.min_y + dy,
            self.max_x + dx,
            self.max_y + dy,
        )
    }

    pub fn expand(&self, margin: f64) -> Bounds {
        Bounds::new(
            self.min_x - margin,
            self.min_y - margin,
            self.max_x + margin,
            self.max_y + margin,
        )
    }

    /// Strict overlap; touching edges do not count.
    pub fn overlaps(&self, other: &Bounds) -> bool {
        const EPS: f64 = 1e-9;
        self.min_x < other.max_x - EPS
            && other.min_x < self.max_x - EPS
            && self.min_y < other.max_y - EPS
            && other.min_y < self.max_y - EPS
    }

    pub fn contains(&self, other: &Bounds) -> bool {
        const EPS: f64 = 1e-9;
        other.min_x >= self.min_x - EPS
            && other.max_x <= self.max_x + EPS
            && other.min_y >= self.min_y - EPS
            && other.max_y <= self.max_y + EPS
    }

    /// Position of a compass anchor on this box.
    pub fn anchor_point(&self, anchor: Anchor) -> Point {
        let c = self.center();
        let x = match anchor {
            Anchor::TopLeft | Anchor::CenterLeft | Anchor::BottomLeft => self.min_x,
            Anchor::TopCenter | Anchor::Center | Anchor::BottomCenter => c.x,
            Anchor::TopRight | Anchor::CenterRight | Anchor::BottomRight => self.max_x,
        };
        let y = match anchor {
            Anchor::TopLeft | Anchor::TopCenter | Anchor::TopRight => self.max_y,
            Anchor::CenterLeft | Anchor::Center | Anchor::CenterRight => c.y,
            Anchor::BottomLeft | Anchor::BottomCenter | Anchor::BottomRight => self.min_y,
        };
        Point::new(x, y)
    }
}

/// One of the nine compass anchor points of a box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    TopLeft,
    TopCenter,
    TopRight,
    CenterLeft,
    Center,
    CenterRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

impl Anchor {
    pub const ALL: [Anchor; 9] = [
        Anchor::TopLeft,
        Anchor::TopCenter,
        Anchor::TopRight,
        Anchor::CenterLeft,
        Anchor::Center,
        Anchor::CenterRight,
        Anchor::BottomLeft,
        Anchor::BottomCenter,
        Anchor::BottomRight,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Anchor::TopLeft => "top_left",
            Anchor::TopCenter => "top_center",
            Anchor::TopRight => "top_right",
            Anchor::CenterLeft => "center_left",
            Anchor::Center => "center",
            Anchor::CenterRight => "center_right",
            Anchor::BottomLeft => "bottom_left",
            Anchor::BottomCenter => "bottom_center",
            Anchor::BottomRight => "bottom_right",
        }
    }

    pub fn parse(s: &str) -> Option<Anchor> {
        Anchor::ALL.into_iter().find(|a| a.as_str() == s)
    }
}

/// A 2D affine transform `[a c e; b d f; 0 0 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn translation(dx: f64, dy: f64) -> Self {
        Transform {
            e: dx,
            f: dy,
            ..Transform::IDENTITY
        }
    }

    /// Counter-clockwise rotation about the origin. Quarter turns are exact.
    pub fn rotation(degrees: f64) -> Self {
        let (sin, cos) = exact_sin_cos(degrees);
        Transform {
            a: cos,
            b: sin,
            c: -sin,
            d: cos,
            e: 0.0,
            f: 0.0,
        }
    }

    /// Rotation about `pivot`: translate(pivot) ∘ rotate ∘ translate(-pivot).
    pub fn rotation_about(degrees: f64, pivot: Point) -> Self {
        compose(&[
            Transform::translation(pivot.x, pivot.y),
            Transform::rotation(degrees),
            Transform::translation(-pivot.x, -pivot.y),
        ])
    }

    /// Returns `self ∘ other` (apply `other` first).
    pub fn then_after(&self, other: &Transform) -> Transform {
        Transform {
            a: self.a * other.a + self.c * other.b,
            b: self.b * other.a + self.d * other.b,
            c: self.a * other.c + self.c * other.d,
            d: self.b * other.c + self.d * other.d,
            e: self.a * other.e + self.c * other.f + self.e,
            f: self.b * other.e + self.d * other.f + self.f,
        }
    }

    pub fn apply(&self, p: Point) -> Point {
        Point::new(
            self.a * p.x + self.c * p.y + self.e,
            self.b * p.x + self.d * p.y + self.f,
        )
    }

    /// Rotation component in degrees, normalized to `[0, 360)`.
    pub fn rotation_degrees(&self) -> f64 {
        normalize_degrees(self.b.atan2(self.a).to_degrees())
    }

    /// The transform undoing `self`, or `None` when it is degenerate.
    pub fn inverse(&self) -> Option<Transform> {
        let det = self.a * self.d - self.c * self.b;
        if det.abs() < 1e-12 {
            return None;
        }
        let (a, b, c, d) = (self.d / det, -self.b / det, -self.c / det, self.a / det);
        Some(Transform {
            a,
            b,
            c,
            d,
            e: -(a * self.e + c * self.f),
            f: -(b * self.e + d * self.f),
        })
    }

    pub fn is_identity(&self) -> bool {
        const EPS: f64 = 1e-12;
        (self.a - 1.0).abs() < EPS
            && self.b.abs() < EPS
            && self.c.abs() < EPS
            && (self.d - 1.0).abs() < EPS
            && self.e.abs() < EPS
            && self.f.abs() < EPS
    }
}

/// Composes transforms right-to-left, like matrix multiplication.
pub fn compose(transforms: &[Transform]) -> Transform {
    transforms
        .iter()
        .fold(Transform::IDENTITY, |acc, t| acc.then_after(t))
}

/// Normalizes an angle to `[0, 360)`.
pub fn normalize_degrees(degrees: f64) -> f64 {
    let r = degrees.rem_euclid(360.0);
    if (r - 360.0).abs() < 1e-9 {
        0.0
    } else {
        r
    }
}

pub fn is_quarter_turn(degrees: f64) -> bool {
    let r = normalize_degrees(degrees);
    (r - 90.0).abs() < 1e-9 || (r - 270.0).abs() < 1e-9
}

fn exact_sin_cos(degrees: f64) -> (f64, f64) {
    let r = normalize_degrees(degrees);
    if r.abs() < 1e-12 {
        (0.0, 1.0)
    } else if (r - 90.0).abs() < 1e-12 {
        (1.0, 0.0)
    } else if (r - 180.0).abs() < 1e-12 {
        (0.0, -1.0)
    } else if (r - 270.0).abs() < 1e-12 {
        (-1.0, 0.0)
    } else {
        let rad = r.to_radians();
        (rad.sin(), rad.cos())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Point, b: Point) -> bool {
        (a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9
    }

    #[test]
    fn quarter_turn_is_exact() {
        let p = Transform::rotation(90.0).apply(Point::new(1.0, 0.0));
        assert_eq!(p, Point::new(0.0, 1.0));
    }

    #[test]
    fn rotation_about_pivot_keeps_pivot_fixed() {
        let pivot = Point::new(3.0, -2.0);
        let t = Transform::rotation_about(270.0, pivot);
        assert!(close(t.apply(pivot), pivot));
        assert!(close(t.apply(Point::new(4.0, -2.0)), Point::new(3.0, -3.0)));
    }

    #[test]
    fn compose_applies_right_to_left() {
        let t = compose(&[
            Transform::translation(10.0, 0.0),
            Transform::rotation(180.0),
        ]);
        assert!(close(t.apply(Point::new(1.0, 1.0)), Point::new(9.0, -1.0)));
        assert!((t.rotation_degrees() - 180.0).abs() < 1e-9);
    }

    #[test]
    fn bounds_anchor_points() {
        let b = Bounds::new(0.0, 0.0, 4.0, 2.0);
        assert_eq!(b.anchor_point(Anchor::TopLeft), Point::new(0.0, 2.0));
        assert_eq!(b.anchor_point(Anchor::Center), Point::new(2.0, 1.0));
        assert_eq!(b.anchor_point(Anchor::BottomRight), Point::new(4.0, 0.0));
    }

    #[test]
    fn touching_bounds_do_not_overlap() {
        let a = Bounds::new(0.0, 0.0, 1.0, 1.0);
        let b = Bounds::new(1.0, 0.0, 2.0, 1.0);
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&Bounds::new(0.5, 0.5, 2.0, 2.0)));
    }

    #[test]
    fn anchor_names_roundtrip() {
        for anchor in Anchor::ALL {
            assert_eq!(Anchor::parse(anchor.as_str()), Some(anchor));
        }
        assert_eq!(Anchor::parse("middle"), None);
    }

    #[test]
    fn size_rotation_swaps_on_quarter_turns() {
        let s = Size::new(2.0, 1.0);
        assert_eq!(s.rotated(90.0), Size::new(1.0, 2.0));
        assert_eq!(s.rotated(180.0), s);
        assert_eq!(s.rotated(-90.0), Size::new(1.0, 2.0));
    }

    #[test]
    fn inverse_undoes_rigid_transform() {
        let t = compose(&[
            Transform::translation(3.0, -2.0),
            Transform::rotation(90.0),
            Transform::translation(-1.0, 1.0),
        ]);
        let back = t.inverse().unwrap().then_after(&t);
        assert!(back.is_identity());
        let p = Point::new(5.0, 7.0);
        let q = t.inverse().unwrap().apply(t.apply(p));
        assert!(q.distance(p) < 1e-9);
    }
}
