//! Per-call send/receive flags.

bitflags::bitflags! {
    /// Flags accepted by `Socket::send` and `Socket::send_frame`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SendFlags: u8 {
        /// Fail with `WouldBlock` instead of waiting
        const DONTWAIT = 1;
        /// More frames of the same message follow
        const MORE = 2;
    }
}

bitflags::bitflags! {
    /// Flags accepted by `Socket::recv` and `Socket::recv_frame`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RecvFlags: u8 {
        /// Fail with `WouldBlock` instead of waiting
        const DONTWAIT = 1;
    }
}
