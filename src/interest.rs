use std::ops;

/// Bitset over {readable, writable}. Disconnect-or-error is always implied
/// by the reactor at registration time and cannot be requested directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interest(u8);

impl Interest {
    const READABLE_BIT: u8 = 0b01;
    const WRITABLE_BIT: u8 = 0b10;

    pub const READABLE: Interest = Interest(Self::READABLE_BIT);
    pub const WRITABLE: Interest = Interest(Self::WRITABLE_BIT);

    pub fn is_readable(self) -> bool {
        self.0 & Self::READABLE_BIT != 0
    }

    pub fn is_writable(self) -> bool {
        self.0 & Self::WRITABLE_BIT != 0
    }
}

impl ops::BitOr for Interest {
    type Output = Interest;

    fn bitor(self, rhs: Interest) -> Interest {
        Interest(self.0 | rhs.0)
    }
}

/// How the kernel reports readiness for a registered descriptor.
///
/// One-shot modes disarm the registration after a single delivery; the
/// caller must call [`crate::reactor::Reactor::mod_fd`] to re-arm before
/// further events are delivered on that fd.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Level,
    Edge,
    LevelOneshot,
    EdgeOneshot,
}

impl Mode {
    pub fn is_edge_triggered(self) -> bool {
        matches!(self, Mode::Edge | Mode::EdgeOneshot)
    }

    pub fn is_oneshot(self) -> bool {
        matches!(self, Mode::LevelOneshot | Mode::EdgeOneshot)
    }
}
