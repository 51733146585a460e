//! Frame scheduling.
//!
//! [`FrameScheduler`] runs one frame per [`FrameScheduler::tick`]: wait for the
//! current frame slot, acquire an image, submit, present and advance the slot.
//! Swapchain staleness at acquire or present, or a resize reported by the
//! window, turns into a rebuild of the swapchain generation. Everything
//! GPU-specific sits behind [`FrameBackend`] and everything window-specific
//! behind [`SurfaceWindow`].

pub use tessera_core::SurfaceWindow;
use tessera_gpu::{Acquired, FrameStage, GpuError, Presented, Result};

/// Where the scheduler is within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Between frames.
    Idle,
    /// Waiting for the current slot's previous submission.
    FrameSlotWait,
    /// Acquiring a swapchain image.
    ImageAcquire,
    /// Updating content and submitting the image's commands.
    Submit,
    /// Presenting the image.
    Present,
    /// Rebuilding the swapchain generation.
    Rebuilding,
}

/// Counters reported at shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames handed to the presentation engine.
    pub frames_presented: u64,
    /// Swapchain generations rebuilt after startup.
    pub rebuilds: u64,
}

/// The GPU side of a frame.
///
/// `slot` is always below [`FrameBackend::slot_count`]; `image_index` is
/// always a value returned by [`FrameBackend::acquire_image`] in the same
/// frame.
pub trait FrameBackend {
    /// Number of frame slots (frames in flight).
    fn slot_count(&self) -> usize;

    /// Block until the slot's previous submission has completed.
    fn wait_for_slot(&mut self, slot: usize) -> Result<()>;

    /// Acquire the next image, signaling the slot's image-available semaphore.
    fn acquire_image(&mut self, slot: usize) -> Result<Acquired>;

    /// Update per-image content before submission.
    fn prepare_frame(&mut self, image_index: u32) -> Result<()>;

    /// Reset the slot's fence and submit the image's commands.
    fn submit(&mut self, slot: usize, image_index: u32) -> Result<()>;

    /// Present the image once the slot's render-finished semaphore signals.
    fn present(&mut self, slot: usize, image_index: u32) -> Result<Presented>;

    /// Wait for the device to go idle, destroy the current generation and
    /// build a new one for the given framebuffer size.
    fn rebuild(&mut self, framebuffer_size: (u32, u32)) -> Result<()>;
}

/// Drives frames through a [`FrameBackend`].
#[derive(Debug)]
pub struct FrameScheduler {
    state: FrameState,
    slot: usize,
    slot_count: usize,
    rebuild_pending: bool,
    stats: FrameStats,
}

impl FrameScheduler {
    /// Create a scheduler for `slot_count` frame slots.
    pub fn new(slot_count: usize) -> Result<Self> {
        if slot_count == 0 {
            return Err(GpuError::InvalidState(
                "Frame scheduler needs at least one slot".to_string(),
            ));
        }

        Ok(Self {
            state: FrameState::Idle,
            slot: 0,
            slot_count,
            rebuild_pending: false,
            stats: FrameStats::default(),
        })
    }

    /// Create a scheduler matching a backend's slot count.
    pub fn for_backend<B: FrameBackend>(backend: &B) -> Result<Self> {
        Self::new(backend.slot_count())
    }

    /// Current state.
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Slot the next frame will use.
    pub fn current_slot(&self) -> usize {
        self.slot
    }

    /// Frame counters.
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Whether a rebuild is waiting for the window to become drawable.
    pub fn rebuild_pending(&self) -> bool {
        self.rebuild_pending
    }

    /// Run one frame.
    ///
    /// Errors are fatal; the state is left at the stage that failed.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn tick<B, W>(&mut self, backend: &mut B, window: &mut W) -> Result<()>
    where
        B: FrameBackend,
        W: SurfaceWindow,
    {
        if self.rebuild_pending {
            self.rebuild(backend, window)?;
            if self.rebuild_pending {
                return Ok(());
            }
        }

        let slot = self.slot;

        self.state = FrameState::FrameSlotWait;
        backend.wait_for_slot(slot)?;

        self.state = FrameState::ImageAcquire;
        let image_index = match backend.acquire_image(slot)? {
            Acquired::Image(index) => index,
            Acquired::Stale => {
                // Nothing was submitted: the slot's fence stays signaled and
                // the slot is reused by the next frame.
                tracing::debug!(slot, "Swapchain out of date at acquire");
                return self.rebuild(backend, window);
            }
            Acquired::Fatal(result) => {
                return Err(GpuError::Frame {
                    stage: FrameStage::Acquire,
                    result,
                })
            }
        };

        self.state = FrameState::Submit;
        backend.prepare_frame(image_index)?;
        backend.submit(slot, image_index)?;

        self.state = FrameState::Present;
        let presented = backend.present(slot, image_index)?;
        self.slot = (slot + 1) % self.slot_count;

        let stale = match presented {
            Presented::Done => false,
            Presented::Stale => true,
            Presented::Fatal(result) => {
                return Err(GpuError::Frame {
                    stage: FrameStage::Present,
                    result,
                })
            }
        };
        self.stats.frames_presented += 1;

        if stale || window.resize_requested() {
            tracing::debug!(stale, "Rebuilding after present");
            return self.rebuild(backend, window);
        }

        self.state = FrameState::Idle;
        Ok(())
    }

    fn rebuild<B, W>(&mut self, backend: &mut B, window: &mut W) -> Result<()>
    where
        B: FrameBackend,
        W: SurfaceWindow,
    {
        self.state = FrameState::Rebuilding;
        window.clear_resize_request();

        if !window.wait_until_drawable() {
            self.rebuild_pending = true;
            return Ok(());
        }

        backend.rebuild(window.framebuffer_size())?;

        self.rebuild_pending = false;
        self.stats.rebuilds += 1;
        tracing::info!(rebuilds = self.stats.rebuilds, "Swapchain rebuilt");

        self.state = FrameState::Idle;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;
    use std::collections::HashMap;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Wait(usize),
        Acquire(usize),
        Prepare(u32),
        Submit(usize, u32),
        Present(usize, u32),
        IdleWait,
        Teardown,
        Build((u32, u32)),
    }

    /// Backend double modelling fences and image rotation.
    struct MockBackend {
        slots: usize,
        images: u32,
        next_image: u32,
        frame: usize,
        /// Scripted acquire results keyed by 1-based frame number.
        acquire_script: HashMap<usize, Acquired>,
        /// Scripted present results keyed by 1-based frame number.
        present_script: HashMap<usize, Presented>,
        /// Whether each slot's fence has an unfinished submission.
        pending: Vec<bool>,
        /// Most submissions ever in flight at once.
        max_in_flight: usize,
        /// Most submissions in flight while a new frame started recording.
        max_ahead: usize,
        calls: Vec<Call>,
    }

    impl MockBackend {
        fn new(slots: usize, images: u32) -> Self {
            Self {
                slots,
                images,
                next_image: 0,
                frame: 0,
                acquire_script: HashMap::new(),
                present_script: HashMap::new(),
                pending: vec![false; slots],
                max_in_flight: 0,
                max_ahead: 0,
                calls: Vec::new(),
            }
        }

        fn count(&self, call: &Call) -> usize {
            self.calls.iter().filter(|c| *c == call).count()
        }

        fn submits(&self) -> usize {
            self.calls
                .iter()
                .filter(|c| matches!(c, Call::Submit(..)))
                .count()
        }
    }

    impl FrameBackend for MockBackend {
        fn slot_count(&self) -> usize {
            self.slots
        }

        fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
            self.calls.push(Call::Wait(slot));
            // The GPU finishes the slot's work while we wait
            self.pending[slot] = false;
            Ok(())
        }

        fn acquire_image(&mut self, slot: usize) -> Result<Acquired> {
            self.frame += 1;
            self.calls.push(Call::Acquire(slot));
            let ahead = self.pending.iter().filter(|&&p| p).count();
            self.max_ahead = self.max_ahead.max(ahead);
            if let Some(&scripted) = self.acquire_script.get(&self.frame) {
                return Ok(scripted);
            }
            let index = self.next_image;
            self.next_image = (self.next_image + 1) % self.images;
            Ok(Acquired::Image(index))
        }

        fn prepare_frame(&mut self, image_index: u32) -> Result<()> {
            self.calls.push(Call::Prepare(image_index));
            Ok(())
        }

        fn submit(&mut self, slot: usize, image_index: u32) -> Result<()> {
            assert!(!self.pending[slot], "fence of slot {slot} reset while pending");
            self.calls.push(Call::Submit(slot, image_index));
            self.pending[slot] = true;
            let in_flight = self.pending.iter().filter(|&&p| p).count();
            self.max_in_flight = self.max_in_flight.max(in_flight);
            Ok(())
        }

        fn present(&mut self, slot: usize, image_index: u32) -> Result<Presented> {
            self.calls.push(Call::Present(slot, image_index));
            Ok(self
                .present_script
                .get(&self.frame)
                .copied()
                .unwrap_or(Presented::Done))
        }

        fn rebuild(&mut self, framebuffer_size: (u32, u32)) -> Result<()> {
            self.calls.push(Call::IdleWait);
            self.pending.iter_mut().for_each(|p| *p = false);
            self.calls.push(Call::Teardown);
            self.calls.push(Call::Build(framebuffer_size));
            self.next_image = 0;
            Ok(())
        }
    }

    struct MockWindow {
        size: (u32, u32),
        resized: bool,
        /// Window never becomes drawable while set.
        closing: bool,
    }

    impl MockWindow {
        fn new(width: u32, height: u32) -> Self {
            Self {
                size: (width, height),
                resized: false,
                closing: false,
            }
        }
    }

    impl SurfaceWindow for MockWindow {
        fn framebuffer_size(&self) -> (u32, u32) {
            self.size
        }

        fn resize_requested(&self) -> bool {
            self.resized
        }

        fn clear_resize_request(&mut self) {
            self.resized = false;
        }

        fn wait_until_drawable(&mut self) -> bool {
            !self.closing
        }
    }

    fn run(
        scheduler: &mut FrameScheduler,
        backend: &mut MockBackend,
        window: &mut MockWindow,
        frames: usize,
    ) {
        for _ in 0..frames {
            scheduler.tick(backend, window).unwrap();
        }
    }

    #[test]
    fn steady_state_frame_order() {
        let mut backend = MockBackend::new(2, 3);
        let mut window = MockWindow::new(800, 600);
        let mut scheduler = FrameScheduler::for_backend(&backend).unwrap();

        scheduler.tick(&mut backend, &mut window).unwrap();

        assert_eq!(
            backend.calls,
            vec![
                Call::Wait(0),
                Call::Acquire(0),
                Call::Prepare(0),
                Call::Submit(0, 0),
                Call::Present(0, 0),
            ]
        );
        assert_eq!(scheduler.current_slot(), 1);
        assert_eq!(scheduler.state(), FrameState::Idle);
        assert_eq!(scheduler.stats().frames_presented, 1);
    }

    #[test]
    fn slots_rotate_and_in_flight_is_bounded() {
        let mut backend = MockBackend::new(2, 3);
        let mut window = MockWindow::new(800, 600);
        let mut scheduler = FrameScheduler::for_backend(&backend).unwrap();

        run(&mut scheduler, &mut backend, &mut window, 10);

        let waited: Vec<usize> = backend
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Wait(slot) => Some(*slot),
                _ => None,
            })
            .collect();
        assert_eq!(waited, vec![0, 1, 0, 1, 0, 1, 0, 1, 0, 1]);
        assert_eq!(backend.max_in_flight, 2);
        assert_eq!(backend.max_ahead, 1);
        assert_eq!(backend.submits(), 10);
        assert_eq!(scheduler.stats().rebuilds, 0);
    }

    #[test]
    fn every_submit_follows_a_wait_on_the_same_slot() {
        let mut backend = MockBackend::new(2, 2);
        let mut window = MockWindow::new(800, 600);
        let mut scheduler = FrameScheduler::for_backend(&backend).unwrap();

        run(&mut scheduler, &mut backend, &mut window, 6);

        let mut last_wait = None;
        for call in &backend.calls {
            match call {
                Call::Wait(slot) => last_wait = Some(*slot),
                Call::Submit(slot, _) => assert_eq!(last_wait, Some(*slot)),
                _ => {}
            }
        }
    }

    #[test]
    fn stale_acquire_rebuilds_once_and_keeps_the_slot() {
        let mut backend = MockBackend::new(2, 3);
        backend.acquire_script.insert(5, Acquired::Stale);
        let mut window = MockWindow::new(1024, 768);
        let mut scheduler = FrameScheduler::for_backend(&backend).unwrap();

        run(&mut scheduler, &mut backend, &mut window, 4);
        let slot_before = scheduler.current_slot();
        let submits_before = backend.submits();

        scheduler.tick(&mut backend, &mut window).unwrap();

        assert_eq!(scheduler.current_slot(), slot_before);
        assert_eq!(backend.submits(), submits_before);
        assert_eq!(backend.count(&Call::IdleWait), 1);
        assert_eq!(backend.count(&Call::Teardown), 1);
        assert_eq!(backend.count(&Call::Build((1024, 768))), 1);
        assert_eq!(scheduler.stats().rebuilds, 1);
        assert_eq!(scheduler.state(), FrameState::Idle);

        // The next frame reuses the same slot and renders normally
        scheduler.tick(&mut backend, &mut window).unwrap();
        let tail = &backend.calls[backend.calls.len() - 5..];
        assert_eq!(tail[0], Call::Wait(slot_before));
        assert_eq!(tail[3], Call::Submit(slot_before, 0));
        assert_eq!(backend.count(&Call::IdleWait), 1);
    }

    #[test]
    fn stale_present_rebuilds_after_advancing() {
        let mut backend = MockBackend::new(2, 3);
        backend.present_script.insert(2, Presented::Stale);
        let mut window = MockWindow::new(640, 480);
        let mut scheduler = FrameScheduler::for_backend(&backend).unwrap();

        run(&mut scheduler, &mut backend, &mut window, 2);

        assert_eq!(scheduler.current_slot(), 0);
        assert_eq!(backend.count(&Call::Build((640, 480))), 1);
        assert_eq!(scheduler.stats().frames_presented, 2);
        assert_eq!(scheduler.stats().rebuilds, 1);
    }

    #[test]
    fn resize_flag_rebuilds_and_is_cleared() {
        let mut backend = MockBackend::new(2, 3);
        let mut window = MockWindow::new(800, 600);
        let mut scheduler = FrameScheduler::for_backend(&backend).unwrap();

        scheduler.tick(&mut backend, &mut window).unwrap();
        window.resized = true;
        window.size = (1280, 720);
        scheduler.tick(&mut backend, &mut window).unwrap();
        scheduler.tick(&mut backend, &mut window).unwrap();

        assert!(!window.resized);
        assert_eq!(backend.count(&Call::Build((1280, 720))), 1);
        assert_eq!(scheduler.stats().rebuilds, 1);
    }

    #[test]
    fn rebuild_waits_for_a_drawable_window() {
        let mut backend = MockBackend::new(2, 3);
        backend.acquire_script.insert(1, Acquired::Stale);
        let mut window = MockWindow::new(800, 600);
        window.closing = true;
        let mut scheduler = FrameScheduler::for_backend(&backend).unwrap();

        scheduler.tick(&mut backend, &mut window).unwrap();
        assert!(scheduler.rebuild_pending());
        assert_eq!(backend.count(&Call::Build((800, 600))), 0);

        // Still not drawable: nothing else happens
        scheduler.tick(&mut backend, &mut window).unwrap();
        assert_eq!(backend.calls.len(), 2);

        window.closing = false;
        scheduler.tick(&mut backend, &mut window).unwrap();
        assert!(!scheduler.rebuild_pending());
        assert_eq!(backend.count(&Call::Build((800, 600))), 1);
        assert_eq!(scheduler.stats().frames_presented, 1);
    }

    #[test]
    fn fatal_acquire_is_an_error() {
        let mut backend = MockBackend::new(2, 3);
        backend
            .acquire_script
            .insert(1, Acquired::Fatal(vk::Result::ERROR_DEVICE_LOST));
        let mut window = MockWindow::new(800, 600);
        let mut scheduler = FrameScheduler::for_backend(&backend).unwrap();

        let err = scheduler.tick(&mut backend, &mut window).unwrap_err();
        assert!(matches!(
            err,
            GpuError::Frame {
                stage: FrameStage::Acquire,
                result: vk::Result::ERROR_DEVICE_LOST
            }
        ));
        assert_eq!(scheduler.state(), FrameState::ImageAcquire);
        assert_eq!(backend.submits(), 0);
    }

    #[test]
    fn fatal_present_is_an_error() {
        let mut backend = MockBackend::new(2, 3);
        backend
            .present_script
            .insert(1, Presented::Fatal(vk::Result::ERROR_SURFACE_LOST_KHR));
        let mut window = MockWindow::new(800, 600);
        let mut scheduler = FrameScheduler::for_backend(&backend).unwrap();

        let err = scheduler.tick(&mut backend, &mut window).unwrap_err();
        assert!(matches!(
            err,
            GpuError::Frame {
                stage: FrameStage::Present,
                ..
            }
        ));
        assert_eq!(scheduler.stats().frames_presented, 0);
    }

    #[test]
    fn identical_runs_are_identical() {
        let trace = || {
            let mut backend = MockBackend::new(2, 3);
            backend.acquire_script.insert(3, Acquired::Stale);
            backend.present_script.insert(6, Presented::Stale);
            let mut window = MockWindow::new(800, 600);
            let mut scheduler = FrameScheduler::for_backend(&backend).unwrap();
            run(&mut scheduler, &mut backend, &mut window, 8);
            (backend.calls, scheduler.stats())
        };

        assert_eq!(trace(), trace());
    }

    #[test]
    fn zero_slots_rejected() {
        assert!(FrameScheduler::new(0).is_err());
    }
}
