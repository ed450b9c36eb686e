use super::{Anchor, Animation, ColorName, Shape, SizeClass};

#[derive(Clone, Copy, Debug)]
pub(crate) struct ShapeKeyword {
    pub keyword: &'static str,
    pub shape: Shape,
}

// Scan order is the priority order: a command naming several shapes
// resolves to the first keyword listed here.
pub(crate) const SHAPE_KEYWORDS: &[ShapeKeyword] = &[
    ShapeKeyword {
        keyword: "circle",
        shape: Shape::Circle,
    },
    ShapeKeyword {
        keyword: "round",
        shape: Shape::Circle,
    },
    ShapeKeyword {
        keyword: "square",
        shape: Shape::Square,
    },
    ShapeKeyword {
        keyword: "rectangle",
        shape: Shape::Rectangle,
    },
    ShapeKeyword {
        keyword: "rect",
        shape: Shape::Rectangle,
    },
    ShapeKeyword {
        keyword: "triangle",
        shape: Shape::Triangle,
    },
    ShapeKeyword {
        keyword: "line",
        shape: Shape::Line,
    },
];

#[derive(Clone, Copy, Debug)]
pub(crate) struct ColorKeyword {
    pub keyword: &'static str,
    pub color: ColorName,
}

pub(crate) const COLOR_KEYWORDS: &[ColorKeyword] = &[
    ColorKeyword {
        keyword: "red",
        color: ColorName::Red,
    },
    ColorKeyword {
        keyword: "blue",
        color: ColorName::Blue,
    },
    ColorKeyword {
        keyword: "green",
        color: ColorName::Green,
    },
    ColorKeyword {
        keyword: "yellow",
        color: ColorName::Yellow,
    },
    ColorKeyword {
        keyword: "orange",
        color: ColorName::Orange,
    },
    ColorKeyword {
        keyword: "purple",
        color: ColorName::Purple,
    },
    ColorKeyword {
        keyword: "pink",
        color: ColorName::Pink,
    },
    ColorKeyword {
        keyword: "black",
        color: ColorName::Black,
    },
    ColorKeyword {
        keyword: "white",
        color: ColorName::White,
    },
    ColorKeyword {
        keyword: "gray",
        color: ColorName::Gray,
    },
    ColorKeyword {
        keyword: "brown",
        color: ColorName::Brown,
    },
];

#[derive(Clone, Copy, Debug)]
pub(crate) struct SizeKeyword {
    pub keyword: &'static str,
    pub size: SizeClass,
}

pub(crate) const SIZE_KEYWORDS: &[SizeKeyword] = &[
    SizeKeyword {
        keyword: "big",
        size: SizeClass::Large,
    },
    SizeKeyword {
        keyword: "large",
        size: SizeClass::Large,
    },
    SizeKeyword {
        keyword: "huge",
        size: SizeClass::Large,
    },
    SizeKeyword {
        keyword: "small",
        size: SizeClass::Small,
    },
    SizeKeyword {
        keyword: "tiny",
        size: SizeClass::Small,
    },
    SizeKeyword {
        keyword: "little",
        size: SizeClass::Small,
    },
];

#[derive(Clone, Copy, Debug)]
pub(crate) struct AnchorKeyword {
    pub keyword: &'static str,
    pub anchor: Anchor,
}

pub(crate) const ANCHOR_KEYWORDS: &[AnchorKeyword] = &[
    AnchorKeyword {
        keyword: "center",
        anchor: Anchor::Center,
    },
    AnchorKeyword {
        keyword: "middle",
        anchor: Anchor::Center,
    },
    AnchorKeyword {
        keyword: "top",
        anchor: Anchor::Top,
    },
    AnchorKeyword {
        keyword: "bottom",
        anchor: Anchor::Bottom,
    },
    AnchorKeyword {
        keyword: "left",
        anchor: Anchor::Left,
    },
    AnchorKeyword {
        keyword: "right",
        anchor: Anchor::Right,
    },
];

#[derive(Clone, Copy, Debug)]
pub(crate) struct AnimationKeyword {
    pub keyword: &'static str,
    pub animation: Animation,
}

pub(crate) const ANIMATION_KEYWORDS: &[AnimationKeyword] = &[
    AnimationKeyword {
        keyword: "spin",
        animation: Animation::Rotate,
    },
    AnimationKeyword {
        keyword: "rotate",
        animation: Animation::Rotate,
    },
    AnimationKeyword {
        keyword: "turning",
        animation: Animation::Rotate,
    },
    AnimationKeyword {
        keyword: "bounce",
        animation: Animation::Bounce,
    },
    AnimationKeyword {
        keyword: "jump",
        animation: Animation::Bounce,
    },
    AnimationKeyword {
        keyword: "move",
        animation: Animation::Move,
    },
    AnimationKeyword {
        keyword: "drift",
        animation: Animation::Move,
    },
];

pub(crate) const NUMBER_WORDS: &[(&str, u32)] = &[
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
    ("ten", 10),
];
