//! Static gatekeeping for generated drawing programs.
//!
//! Two independent checks guard two boundaries. The generator boundary
//! demands the full program structure and screens against the complete
//! capability denylist with a 10k ceiling; the executor runs its own
//! stricter pre-execution pass (shorter ceiling, the runtime-relevant
//! denylist, no structural demand — missing blocks get defaults there).
//! Both are best-effort filters for a single local user's own commands,
//! not a hardened sandbox.

/// Ceiling applied when accepting a program from a generation provider.
pub const GENERATED_MAX_LEN: usize = 10_000;

/// Stricter ceiling applied immediately before execution.
pub const RENDER_MAX_LEN: usize = 5_000;

/// Capability-escalating tokens that disqualify a generated program.
pub const CAPABILITY_DENYLIST: &[&str] = &[
    "eval",
    "Function",
    "setTimeout",
    "setInterval",
    "fetch",
    "XMLHttpRequest",
    "import",
    "require",
    "document.",
    "window.",
    "localStorage",
    "sessionStorage",
];

/// Subset re-checked at the execution boundary.
pub const RENDER_DENYLIST: &[&str] = &[
    "eval",
    "Function",
    "setTimeout",
    "setInterval",
    "fetch",
    "XMLHttpRequest",
];

const STRUCTURAL_MARKERS: &[(&str, &str)] = &[
    ("function setup", "missing setup block"),
    ("function draw", "missing draw block"),
    ("createCanvas", "missing canvas creation"),
];

/// Why the generator boundary rejects `code`, or `None` when it passes.
pub fn rejection_reason(code: &str) -> Option<String> {
    if code.trim().is_empty() {
        return Some("empty program".to_string());
    }
    for (marker, reason) in STRUCTURAL_MARKERS {
        if !code.contains(marker) {
            return Some((*reason).to_string());
        }
    }
    for token in CAPABILITY_DENYLIST {
        if code.contains(token) {
            return Some(format!("denylisted token: {token}"));
        }
    }
    if code.len() > GENERATED_MAX_LEN {
        return Some(format!("program exceeds {GENERATED_MAX_LEN} chars"));
    }
    None
}

pub fn validate_generated(code: &str) -> bool {
    rejection_reason(code).is_none()
}

/// Why the executor refuses to run `code`, or `None` when it may run.
pub fn render_rejection_reason(code: &str) -> Option<String> {
    if code.trim().is_empty() {
        return Some("empty program".to_string());
    }
    for token in RENDER_DENYLIST {
        if code.contains(token) {
            return Some(format!("denylisted token: {token}"));
        }
    }
    if code.len() > RENDER_MAX_LEN {
        return Some(format!("program exceeds {RENDER_MAX_LEN} chars"));
    }
    None
}

pub fn precheck_render(code: &str) -> bool {
    render_rejection_reason(code).is_none()
}
