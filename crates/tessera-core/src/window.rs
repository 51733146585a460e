//! The window contract the frame scheduler relies on.

/// The window the swapchain presents to.
pub trait SurfaceWindow {
    /// Current framebuffer size in pixels.
    fn framebuffer_size(&self) -> (u32, u32);

    /// Whether the window was resized since the flag was last cleared.
    fn resize_requested(&self) -> bool;

    /// Clear the resize flag.
    fn clear_resize_request(&mut self);

    /// Block while the framebuffer has zero area.
    ///
    /// Returns `false` if the window stopped waiting without becoming
    /// drawable, for example because it is closing.
    fn wait_until_drawable(&mut self) -> bool;
}
