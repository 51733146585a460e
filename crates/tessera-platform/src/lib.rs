//! Platform abstraction for the Tessera engine.
//!
//! Provides a winit window driven by an explicit loop: [`Window::tick`] pumps
//! pending events without blocking and records close and resize requests for
//! the frame scheduler.

use std::time::Duration;

use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
};
use tessera_core::SurfaceWindow;
use thiserror::Error;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window as WinitWindow, WindowId};

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Window creation failed: {0}")]
    WindowCreation(String),
    #[error("Event loop error: {0}")]
    EventLoop(String),
}

pub type Result<T> = std::result::Result<T, PlatformError>;

/// Platform configuration.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            title: "Tessera".to_string(),
            width: 800,
            height: 600,
            resizable: true,
        }
    }
}

/// Flags collected while pumping events.
#[derive(Debug, Default)]
struct EventState {
    close_requested: bool,
    resized: bool,
}

impl EventState {
    fn handle(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                tracing::info!("Close requested");
                self.close_requested = true;
            }
            WindowEvent::Resized(size) => {
                tracing::debug!(width = size.width, height = size.height, "Window resized");
                self.resized = true;
            }
            _ => {}
        }
    }
}

/// Event handler for one pump. Creates the window on the first resume.
struct Handler<'a> {
    config: &'a PlatformConfig,
    state: &'a mut EventState,
    window: Option<WinitWindow>,
    error: Option<PlatformError>,
    create: bool,
}

impl ApplicationHandler for Handler<'_> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if !self.create || self.window.is_some() {
            return;
        }

        let attributes = WinitWindow::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height))
            .with_resizable(self.config.resizable);

        match event_loop.create_window(attributes) {
            Ok(window) => self.window = Some(window),
            Err(e) => {
                self.error = Some(PlatformError::WindowCreation(e.to_string()));
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        self.state.handle(&event);
    }
}

/// An application window.
pub struct Window {
    // Field order matters: the window must be dropped before its event loop.
    window: WinitWindow,
    event_loop: EventLoop<()>,
    config: PlatformConfig,
    state: EventState,
}

impl Window {
    /// Open a window.
    pub fn new(config: PlatformConfig) -> Result<Self> {
        let mut event_loop =
            EventLoop::new().map_err(|e| PlatformError::EventLoop(e.to_string()))?;
        let mut state = EventState::default();

        let mut handler = Handler {
            config: &config,
            state: &mut state,
            window: None,
            error: None,
            create: true,
        };

        // The first resume arrives within the first few pumps.
        while handler.window.is_none() {
            let status = event_loop.pump_app_events(Some(Duration::from_millis(10)), &mut handler);
            if let Some(error) = handler.error.take() {
                return Err(error);
            }
            if let PumpStatus::Exit(code) = status {
                return Err(PlatformError::EventLoop(format!(
                    "Event loop exited with code {code} before the window opened"
                )));
            }
        }

        let window = handler
            .window
            .take()
            .ok_or_else(|| PlatformError::WindowCreation("No window created".to_string()))?;

        let size = window.inner_size();
        tracing::info!(
            title = %config.title,
            width = size.width,
            height = size.height,
            "Window created"
        );

        // Size changes during creation are not resizes
        state.resized = false;

        Ok(Self {
            window,
            event_loop,
            config,
            state,
        })
    }

    /// Process pending events without blocking.
    pub fn tick(&mut self) {
        self.pump(Some(Duration::ZERO));
    }

    /// Whether the user asked to close the window.
    pub fn should_close(&self) -> bool {
        self.state.close_requested
    }

    /// The configuration the window was opened with.
    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    fn pump(&mut self, timeout: Option<Duration>) {
        let mut handler = Handler {
            config: &self.config,
            state: &mut self.state,
            window: None,
            error: None,
            create: false,
        };

        if let PumpStatus::Exit(code) = self.event_loop.pump_app_events(timeout, &mut handler) {
            tracing::debug!(code, "Event loop exited");
            self.state.close_requested = true;
        }
    }
}

impl SurfaceWindow for Window {
    fn framebuffer_size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    fn resize_requested(&self) -> bool {
        self.state.resized
    }

    fn clear_resize_request(&mut self) {
        self.state.resized = false;
    }

    fn wait_until_drawable(&mut self) -> bool {
        let mut logged = false;
        loop {
            if self.state.close_requested {
                return false;
            }
            let (width, height) = self.framebuffer_size();
            if width > 0 && height > 0 {
                return true;
            }
            if !logged {
                tracing::debug!("Framebuffer has zero area, waiting");
                logged = true;
            }
            // Blocks until the next event arrives
            self.pump(None);
        }
    }
}

impl HasDisplayHandle for Window {
    fn display_handle(&self) -> std::result::Result<DisplayHandle<'_>, HandleError> {
        self.window.display_handle()
    }
}

impl HasWindowHandle for Window {
    fn window_handle(&self) -> std::result::Result<WindowHandle<'_>, HandleError> {
        self.window.window_handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_request_is_recorded() {
        let mut state = EventState::default();
        state.handle(&WindowEvent::CloseRequested);
        assert!(state.close_requested);
        assert!(!state.resized);
    }

    #[test]
    fn resize_sets_flag_even_when_minimized() {
        let mut state = EventState::default();
        state.handle(&WindowEvent::Resized(PhysicalSize::new(0, 0)));
        assert!(state.resized);
        assert!(!state.close_requested);
    }

    #[test]
    fn other_events_are_ignored() {
        let mut state = EventState::default();
        state.handle(&WindowEvent::Focused(true));
        assert!(!state.resized);
        assert!(!state.close_requested);
    }

    #[test]
    fn default_config_is_resizable() {
        let config = PlatformConfig::default();
        assert!(config.resizable);
        assert!(config.width > 0 && config.height > 0);
    }
}
