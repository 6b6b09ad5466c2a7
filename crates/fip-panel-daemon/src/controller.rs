//! Panel controller: page lifecycle, rendering, event dispatch and settings.
//!
//! Every shared resource sits behind its own lock: the frame buffer (which
//! also serializes device writes), the binding tables, the page registry and
//! the telemetry values. No lock is held across an await point.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use fip_panel_hw::{
    ButtonIdentity, DeviceAdapter, DeviceEvent, Edge, Frame, ImageNormalizer, PanelControl,
};
use image::DynamicImage;
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::bindings::{BindingStore, KeySequence, ProtocolCommand};
use crate::config::Config;
use crate::diagnostics;
use crate::error::{Error, Result};
use crate::gauges::{self, Gauge};
use crate::output::{play_sequence, CommandSink, KeyEmitter};
use crate::pages::{AddOutcome, PageRegistry, RemoveOutcome};
use crate::profile::ProfileStore;
use crate::rendering::Canvas;
use crate::settings::{self, ImportReport};
use crate::telemetry::{TelemetrySnapshot, TelemetryState};

/// Minimum spacing of repeated render error reports and diagnostic dumps.
const ERROR_REPORT_INTERVAL: Duration = Duration::from_secs(60);

/// Lifecycle of a [`PanelController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelState {
    Uninitialized,
    Running,
    ShuttingDown,
    Closed,
}

impl fmt::Display for PanelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PanelState::Uninitialized => "uninitialized",
            PanelState::Running => "running",
            PanelState::ShuttingDown => "shutting-down",
            PanelState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Change notifications for the D-Bus layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelSignal {
    /// A binding was added, changed or removed.
    SettingsChanged,
    /// A page was added or removed.
    PagesChanged,
    /// The page shown on the device changed.
    ActivePageChanged(Option<u32>),
    /// The controller moved to a new lifecycle state.
    StateChanged(PanelState),
}

/// Result of dispatching one button edge.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// Protocol commands delivered.
    pub commands_sent: usize,
    /// Playback of the bound key sequence, if any.
    pub playback: Option<JoinHandle<()>>,
}

/// Owner of one physical panel.
pub struct PanelController {
    config: Config,
    device: Arc<dyn DeviceAdapter>,
    keys: Arc<dyn KeyEmitter>,
    commands: Arc<dyn CommandSink>,
    profiles: Option<Arc<dyn ProfileStore>>,
    normalizer: ImageNormalizer,
    gauges: HashMap<u32, Box<dyn Gauge>>,
    diagnostics_dir: PathBuf,

    /// Last transmitted frame; the lock also serializes device writes
    frame: Mutex<Frame>,
    bindings: Mutex<BindingStore>,
    pages: Mutex<PageRegistry>,
    telemetry: Mutex<TelemetryState>,

    state: RwLock<PanelState>,
    active_page: RwLock<Option<u32>>,
    last_mask: Mutex<u32>,
    last_dump: Mutex<Option<Instant>>,

    stop: AtomicBool,
    wake: Notify,
    render_task: Mutex<Option<JoinHandle<()>>>,
    dispatch_task: Mutex<Option<JoinHandle<()>>>,
    signal_tx: broadcast::Sender<PanelSignal>,
}

impl PanelController {
    /// Creates a controller; nothing touches the device until [`start`](Self::start).
    pub fn new(
        config: Config,
        device: Arc<dyn DeviceAdapter>,
        keys: Arc<dyn KeyEmitter>,
        commands: Arc<dyn CommandSink>,
        profiles: Option<Arc<dyn ProfileStore>>,
    ) -> Self {
        let (signal_tx, _) = broadcast::channel(32);

        let mut bindings = BindingStore::new();
        let observer_tx = signal_tx.clone();
        bindings.set_observer(move || {
            let _ = observer_tx.send(PanelSignal::SettingsChanged);
        });

        let mut gauges = HashMap::new();
        for page in &config.pages {
            let gauge = gauges::create_gauge(&page.gauge).unwrap_or_else(|| {
                warn!(
                    "Unknown gauge '{}' on page {}, falling back to 'splash' (available: {})",
                    page.gauge,
                    page.id,
                    gauges::available_gauges().join(", ")
                );
                Box::new(gauges::SplashGauge::new()) as Box<dyn Gauge>
            });
            gauges.insert(page.id, gauge);
        }

        Self {
            pages: Mutex::new(PageRegistry::new(&config.instance)),
            normalizer: ImageNormalizer::new(),
            device,
            keys,
            commands,
            profiles,
            gauges,
            diagnostics_dir: std::env::temp_dir(),
            frame: Mutex::new(Frame::new()),
            bindings: Mutex::new(bindings),
            telemetry: Mutex::new(TelemetryState::new()),
            state: RwLock::new(PanelState::Uninitialized),
            active_page: RwLock::new(None),
            last_mask: Mutex::new(0),
            last_dump: Mutex::new(None),
            stop: AtomicBool::new(false),
            wake: Notify::new(),
            render_task: Mutex::new(None),
            dispatch_task: Mutex::new(None),
            signal_tx,
            config,
        }
    }

    /// Directory receiving bitmaps of frames the device rejected.
    pub fn with_diagnostics_dir(mut self, dir: PathBuf) -> Self {
        self.diagnostics_dir = dir;
        self
    }

    /// Registers the configured pages, restores the saved profile and starts
    /// the render and dispatch tasks.
    pub fn start(self: &Arc<Self>, events: mpsc::Receiver<DeviceEvent>) -> Result<()> {
        {
            let mut state = self.state.write().unwrap();
            if *state != PanelState::Uninitialized {
                return Err(Error::InvalidState(format!("cannot start while {}", state)));
            }
            *state = PanelState::Running;
        }
        info!(
            "Starting panel '{}' on {}",
            self.config.instance,
            self.device.describe()
        );

        let mut first_active = None;
        {
            let mut pages = self.pages.lock().unwrap();
            for page in &self.config.pages {
                match pages.add(self.device.as_ref(), page.id, page.active) {
                    Ok(_) if page.active && first_active.is_none() => first_active = Some(page.id),
                    Ok(_) => {}
                    Err(e) => warn!("Page {} not registered: {}", page.id, e),
                }
            }
            if first_active.is_none() {
                first_active = pages.pages().first().copied();
            }
        }
        self.set_active_page(first_active);

        self.restore_profile();

        let render = tokio::spawn(Arc::clone(self).render_loop());
        let dispatch = tokio::spawn(Arc::clone(self).dispatch_loop(events));
        *self.render_task.lock().unwrap() = Some(render);
        *self.dispatch_task.lock().unwrap() = Some(dispatch);

        let _ = self
            .signal_tx
            .send(PanelSignal::StateChanged(PanelState::Running));
        Ok(())
    }

    fn restore_profile(&self) {
        let Some(profiles) = &self.profiles else {
            return;
        };
        match profiles.load(&self.config.instance) {
            Ok(Some(records)) => {
                let mut store = self.bindings.lock().unwrap();
                let report = settings::import_all(&records, &mut store);
                store.mark_clean();
                if !report.is_clean() {
                    warn!("{} saved record(s) could not be restored", report.issues.len());
                }
                info!(
                    "Restored {} key and {} protocol binding(s)",
                    report.key_bindings, report.protocol_bindings
                );
            }
            Ok(None) => debug!("No saved profile for '{}'", self.config.instance),
            Err(e) => warn!("Failed to load profile: {}", e),
        }
    }

    /// Stops the tasks, removes every page from the device and closes the panel.
    pub async fn shutdown(&self) {
        {
            let mut state = self.state.write().unwrap();
            match *state {
                PanelState::ShuttingDown | PanelState::Closed => return,
                _ => *state = PanelState::ShuttingDown,
            }
        }
        info!("Shutting down panel '{}'", self.config.instance);
        let _ = self
            .signal_tx
            .send(PanelSignal::StateChanged(PanelState::ShuttingDown));

        self.stop.store(true, Ordering::SeqCst);
        self.wake.notify_one();

        let render = self.render_task.lock().unwrap().take();
        if let Some(handle) = render {
            if let Err(e) = handle.await {
                warn!("Render task ended abnormally: {}", e);
            }
        }
        let dispatch = self.dispatch_task.lock().unwrap().take();
        if let Some(handle) = dispatch {
            handle.abort();
        }

        self.pages.lock().unwrap().shutdown(self.device.as_ref());
        self.set_active_page(None);

        *self.state.write().unwrap() = PanelState::Closed;
        let _ = self
            .signal_tx
            .send(PanelSignal::StateChanged(PanelState::Closed));
        info!("Panel '{}' closed", self.config.instance);
    }

    // Rendering

    async fn render_loop(self: Arc<Self>) {
        // Errors since the last report
        let mut suppressed: u32 = 0;
        let mut last_report: Option<Instant> = None;

        loop {
            if self.stop.load(Ordering::SeqCst) {
                break;
            }

            if let Err(e) = self.render_frame() {
                match last_report {
                    None => {
                        warn!("Render error: {}", e);
                        last_report = Some(Instant::now());
                    }
                    Some(at) if at.elapsed() >= ERROR_REPORT_INTERVAL => {
                        warn!(
                            "Render error (repeated {} times in {:?}): {}",
                            suppressed + 1,
                            at.elapsed(),
                            e
                        );
                        suppressed = 0;
                        last_report = Some(Instant::now());
                    }
                    Some(_) => suppressed += 1,
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.refresh_interval()) => {}
                _ = self.wake.notified() => {}
            }
        }
        debug!("Render loop stopped");
    }

    /// Draws the active page's gauge and sends it to the device.
    pub fn render_frame(&self) -> Result<()> {
        let Some(page) = self.active_page() else {
            return Ok(());
        };
        let snapshot = self.telemetry_snapshot();

        let fallback = gauges::SplashGauge::new();
        let gauge: &dyn Gauge = match self.gauges.get(&page) {
            Some(gauge) => gauge.as_ref(),
            None => &fallback,
        };

        let mut canvas = Canvas::new(self.config.canvas.width, self.config.canvas.height)?;
        gauge.render(&mut canvas, &snapshot);
        let image = canvas.to_image()?;
        self.set_image(page, Some(&image), gauge.name())
    }

    /// Normalizes `image` and transmits it to `page`.
    ///
    /// The page does not have to be tracked. When the device rejects the
    /// frame a copy is written to the diagnostics directory, at most once
    /// per report interval.
    pub fn set_image(&self, page: u32, image: Option<&DynamicImage>, gauge: &str) -> Result<()> {
        let normalized = self.normalizer.normalize(image).map_err(|e| {
            warn!("Cannot prepare image for page {} ({}): {}", page, gauge, e);
            e
        })?;

        let mut frame = self.frame.lock().unwrap();
        *frame = normalized;
        match self.device.set_image(page, frame.data(), frame.stride()) {
            Ok(()) => Ok(()),
            Err(e) => {
                if self.dump_due() {
                    warn!(
                        "Device rejected image for page {} (gauge {}): {}",
                        page, gauge, e
                    );
                    diagnostics::dump_frame(&self.diagnostics_dir, &frame);
                } else {
                    debug!("Device rejected image for page {} (gauge {}): {}", page, gauge, e);
                }
                Err(e.into())
            }
        }
    }

    fn dump_due(&self) -> bool {
        let mut last = self.last_dump.lock().unwrap();
        match *last {
            Some(at) if at.elapsed() < ERROR_REPORT_INTERVAL => false,
            _ => {
                *last = Some(Instant::now());
                true
            }
        }
    }

    // Event dispatch

    async fn dispatch_loop(self: Arc<Self>, mut events: mpsc::Receiver<DeviceEvent>) {
        while let Some(event) = events.recv().await {
            if self.stop.load(Ordering::SeqCst) {
                break;
            }
            self.handle_event(event);
        }
        debug!("Event dispatch stopped");
    }

    /// Applies one device event.
    ///
    /// Key playbacks are spawned; their handles are returned for callers
    /// that need to wait for them.
    pub fn handle_event(&self, event: DeviceEvent) -> Vec<JoinHandle<()>> {
        match event {
            DeviceEvent::PageActivation { page, activated } => {
                debug!("Page {} activated: {}", page, activated);
                if activated {
                    self.set_active_page(Some(page));
                    self.wake.notify_one();
                } else if self.active_page() == Some(page) {
                    self.set_active_page(None);
                }
                Vec::new()
            }
            DeviceEvent::Buttons { mask } => {
                let previous = std::mem::replace(&mut *self.last_mask.lock().unwrap(), mask);
                let changed = previous ^ mask;
                PanelControl::from_mask(changed)
                    .filter_map(|control| {
                        let edge = Edge::from_flag(mask & control.mask_bit() != 0);
                        self.dispatch_button(control, edge).playback
                    })
                    .collect()
            }
        }
    }

    /// Identity of `control` on the active page.
    pub fn identify(&self, control: PanelControl) -> ButtonIdentity {
        let profile = self
            .active_page()
            .and_then(|page| self.config.page(page))
            .and_then(|page| page.profile());
        match profile {
            Some(profile) => ButtonIdentity::on_page(control, profile),
            None => ButtonIdentity::new(control),
        }
    }

    /// Runs both binding tables for one button edge.
    pub fn dispatch_button(&self, control: PanelControl, edge: Edge) -> DispatchOutcome {
        let button = self.identify(control);
        let (sequence, commands) = {
            let store = self.bindings.lock().unwrap();
            debug!("Button {} {} [{}]", button, edge, store.describe_keys(button));
            (
                store.lookup_key(button, edge),
                store.lookup_protocol(button, edge),
            )
        };

        let mut outcome = DispatchOutcome::default();
        if let Some(sequence) = sequence.filter(|s| !s.is_empty()) {
            let keys = Arc::clone(&self.keys);
            outcome.playback = Some(tokio::spawn(async move {
                play_sequence(keys.as_ref(), &sequence).await;
            }));
        }
        for command in commands.unwrap_or_default() {
            match self.commands.send(&command) {
                Ok(()) => outcome.commands_sent += 1,
                Err(e) => warn!("Failed to send '{}' for {}: {}", command, button, e),
            }
        }

        if edge == Edge::OnTurnedOn {
            match control {
                PanelControl::PageUp => self.step_page(false),
                PanelControl::PageDown => self.step_page(true),
                _ => {}
            }
        }
        outcome
    }

    fn step_page(&self, forward: bool) {
        let next = {
            let pages = self.pages.lock().unwrap();
            let current = self.active_page().unwrap_or(u32::MAX);
            if forward {
                pages.next_page(current)
            } else {
                pages.previous_page(current)
            }
        };
        if next.is_some() && next != self.active_page() {
            self.set_active_page(next);
            self.wake.notify_one();
        }
    }

    // Pages

    /// Registers a page with the device.
    pub fn add_page(&self, page: u32, active: bool) -> Result<AddOutcome> {
        self.ensure_open()?;
        let outcome = self
            .pages
            .lock()
            .unwrap()
            .add(self.device.as_ref(), page, active)?;
        if outcome == AddOutcome::Added {
            let _ = self.signal_tx.send(PanelSignal::PagesChanged);
        }
        if active {
            self.set_active_page(Some(page));
        }
        Ok(outcome)
    }

    /// Removes a page from the device.
    pub fn remove_page(&self, page: u32) -> Result<RemoveOutcome> {
        self.ensure_open()?;
        let (outcome, first) = {
            let mut pages = self.pages.lock().unwrap();
            let outcome = pages.remove(self.device.as_ref(), page)?;
            (outcome, pages.pages().first().copied())
        };
        if outcome == RemoveOutcome::Removed {
            let _ = self.signal_tx.send(PanelSignal::PagesChanged);
            if self.active_page() == Some(page) {
                self.set_active_page(first);
            }
        }
        Ok(outcome)
    }

    /// Tracked pages in registration order.
    pub fn pages(&self) -> Vec<u32> {
        self.pages.lock().unwrap().pages().to_vec()
    }

    pub fn active_page(&self) -> Option<u32> {
        *self.active_page.read().unwrap()
    }

    fn set_active_page(&self, page: Option<u32>) {
        let changed = {
            let mut active = self.active_page.write().unwrap();
            std::mem::replace(&mut *active, page) != page
        };
        if changed {
            debug!("Active page: {:?}", page);
            let _ = self.signal_tx.send(PanelSignal::ActivePageChanged(page));
        }
    }

    // Bindings

    /// Sets the keystroke binding of a button edge; an empty sequence clears it.
    pub fn set_key_binding(
        &self,
        button: ButtonIdentity,
        edge: Edge,
        sequence: KeySequence,
        information: &str,
    ) -> Result<()> {
        self.ensure_open()?;
        self.bindings
            .lock()
            .unwrap()
            .set_key_binding(button, edge, sequence, information);
        Ok(())
    }

    /// Sets the protocol binding of a button edge.
    pub fn set_protocol_binding(
        &self,
        button: ButtonIdentity,
        edge: Edge,
        commands: Vec<ProtocolCommand>,
        description: &str,
    ) -> Result<()> {
        self.ensure_open()?;
        self.bindings
            .lock()
            .unwrap()
            .set_protocol_binding(button, edge, commands, description);
        Ok(())
    }

    /// Removes every binding of a button.
    pub fn clear_bindings(&self, button: ButtonIdentity) -> Result<()> {
        self.ensure_open()?;
        self.bindings.lock().unwrap().clear_all(button);
        Ok(())
    }

    /// Removes all bindings.
    pub fn clear_all_bindings(&self) -> Result<()> {
        self.ensure_open()?;
        self.bindings.lock().unwrap().clear();
        Ok(())
    }

    /// Settings records of every configured binding; empty once shut down.
    pub fn export_settings(&self) -> Vec<String> {
        if !self.is_open() {
            return Vec::new();
        }
        settings::export_all(&self.bindings.lock().unwrap())
    }

    /// Replaces all bindings with `records`.
    pub fn import_settings<I, S>(&self, records: I) -> Result<ImportReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ensure_open()?;
        let mut store = self.bindings.lock().unwrap();
        Ok(settings::import_all(records, &mut store))
    }

    /// Writes the current bindings to the profile store.
    ///
    /// Returns the number of records saved.
    pub fn save_profile(&self) -> Result<usize> {
        self.ensure_open()?;
        let profiles = self
            .profiles
            .as_ref()
            .ok_or_else(|| Error::InvalidState("no profile store configured".to_string()))?;

        let records = {
            let mut store = self.bindings.lock().unwrap();
            let records = settings::export_all(&store);
            store.mark_clean();
            records
        };
        if let Err(e) = profiles.save(&self.config.instance, &records) {
            self.bindings.lock().unwrap().mark_dirty();
            return Err(e);
        }
        Ok(records.len())
    }

    /// Whether bindings changed since the last load or save.
    pub fn is_dirty(&self) -> bool {
        self.bindings.lock().unwrap().is_dirty()
    }

    // Telemetry

    /// Stores a telemetry value for the next rendered frame.
    pub fn on_telemetry(&self, address: u32, value: u32) {
        self.telemetry.lock().unwrap().update(address, value);
    }

    pub fn telemetry_snapshot(&self) -> TelemetrySnapshot {
        self.telemetry.lock().unwrap().snapshot()
    }

    // State

    pub fn state(&self) -> PanelState {
        *self.state.read().unwrap()
    }

    pub fn instance(&self) -> &str {
        &self.config.instance
    }

    /// Receiver for change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<PanelSignal> {
        self.signal_tx.subscribe()
    }

    fn is_open(&self) -> bool {
        matches!(
            self.state(),
            PanelState::Uninitialized | PanelState::Running
        )
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(Error::Closed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::{KeyAction, KeyStep};
    use crate::config::PageConfig;
    use crate::output::{RecordingCommandSink, RecordingKeyEmitter};
    use crate::profile::FileProfileStore;
    use fip_panel_hw::sim::DeviceCall;
    use fip_panel_hw::{DeviceStatus, EventSink, ProfilePage, SimulatedDevice};

    const S1: ButtonIdentity = ButtonIdentity::new(PanelControl::SoftButton1);

    struct Harness {
        controller: Arc<PanelController>,
        device: Arc<SimulatedDevice>,
        keys: Arc<RecordingKeyEmitter>,
        commands: Arc<RecordingCommandSink>,
        dir: tempfile::TempDir,
    }

    fn page(id: u32, active: bool, profile_page: Option<u8>) -> PageConfig {
        PageConfig {
            id,
            gauge: "splash".to_string(),
            active,
            profile_page,
        }
    }

    fn harness(pages: Vec<PageConfig>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            pages,
            state_dir: dir.path().join("state"),
            ..Config::default()
        };
        let device = Arc::new(SimulatedDevice::new());
        let keys = Arc::new(RecordingKeyEmitter::new());
        let commands = Arc::new(RecordingCommandSink::default());
        let profiles: Arc<dyn ProfileStore> =
            Arc::new(FileProfileStore::new(&config.state_dir));
        let controller = PanelController::new(
            config,
            device.clone(),
            keys.clone(),
            commands.clone(),
            Some(profiles),
        )
        .with_diagnostics_dir(dir.path().to_path_buf());

        Harness {
            controller: Arc::new(controller),
            device,
            keys,
            commands,
            dir,
        }
    }

    fn idle_events() -> mpsc::Receiver<DeviceEvent> {
        let (_sink, rx) = EventSink::channel(8);
        rx
    }

    fn image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(image::RgbImage::new(width, height))
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_sequence_on_press_only() {
        let h = harness(vec![page(0, true, None)]);
        let sequence = KeySequence::new(vec![
            KeyStep::press("A", 0).unwrap(),
            KeyStep::release("A", 50).unwrap(),
        ]);
        let release_sequence = KeySequence::tap("B", Duration::from_millis(20)).unwrap();
        h.controller
            .set_key_binding(S1, Edge::OnTurnedOn, sequence, "")
            .unwrap();
        h.controller
            .set_key_binding(S1, Edge::OnTurnedOff, release_sequence.clone(), "")
            .unwrap();

        let bit = PanelControl::SoftButton1.mask_bit();
        let playbacks = h.controller.handle_event(DeviceEvent::Buttons { mask: bit });
        assert_eq!(playbacks.len(), 1);
        for playback in playbacks {
            playback.await.unwrap();
        }

        assert_eq!(
            h.keys.events(),
            vec![
                ("A".to_string(), KeyAction::Press, Duration::ZERO),
                ("A".to_string(), KeyAction::Release, Duration::from_millis(50)),
            ]
        );
        assert_eq!(
            h.controller.bindings.lock().unwrap().lookup_key(S1, Edge::OnTurnedOff),
            Some(release_sequence)
        );

        let released = h.controller.handle_event(DeviceEvent::Buttons { mask: 0 });
        assert_eq!(released.len(), 1);
        for playback in released {
            playback.await.unwrap();
        }
        let keys: Vec<_> = h
            .keys
            .events()
            .into_iter()
            .map(|(key, action, _)| (key, action))
            .collect();
        assert_eq!(
            keys[2..],
            [
                ("B".to_string(), KeyAction::Press),
                ("B".to_string(), KeyAction::Release),
            ]
        );
        assert!(h.commands.sent().is_empty());
    }

    #[tokio::test]
    async fn test_both_tables_fire() {
        let h = harness(vec![page(0, true, None)]);
        let report = h
            .controller
            .import_settings([
                "KeyBinding{1SOFTBUTTON_1};;;;G:Press@0ms,G:Release@10ms",
                "ProtocolBinding{1SOFTBUTTON_1};;;;GEAR_LEVER TOGGLE|GEAR_LIGHT 1",
            ])
            .unwrap();
        assert!(report.is_clean());

        let outcome = h.controller.dispatch_button(PanelControl::SoftButton1, Edge::OnTurnedOn);
        assert_eq!(outcome.commands_sent, 2);
        outcome.playback.unwrap().await.unwrap();

        assert_eq!(h.keys.events().len(), 2);
        assert_eq!(
            h.commands.sent(),
            vec![
                "GEAR_LEVER TOGGLE".parse().unwrap(),
                "GEAR_LIGHT 1".parse().unwrap()
            ]
        );
    }

    #[tokio::test]
    async fn test_profile_page_qualifies_buttons() {
        let h = harness(vec![page(0, true, None), page(1, false, Some(2))]);
        let qualified = ButtonIdentity::on_page(PanelControl::SoftButton1, ProfilePage::P2);
        h.controller
            .set_protocol_binding(qualified, Edge::OnTurnedOn, vec!["A 1".parse().unwrap()], "")
            .unwrap();
        h.controller
            .set_protocol_binding(S1, Edge::OnTurnedOn, vec!["B 1".parse().unwrap()], "")
            .unwrap();

        h.controller.handle_event(DeviceEvent::PageActivation { page: 0, activated: true });
        h.controller.dispatch_button(PanelControl::SoftButton1, Edge::OnTurnedOn);
        h.controller.handle_event(DeviceEvent::PageActivation { page: 1, activated: true });
        h.controller.dispatch_button(PanelControl::SoftButton1, Edge::OnTurnedOn);

        assert_eq!(
            h.commands.sent(),
            vec!["B 1".parse().unwrap(), "A 1".parse().unwrap()]
        );
    }

    #[tokio::test]
    async fn test_page_buttons_cycle_pages() {
        let h = harness(vec![page(3, true, None), page(5, false, None), page(7, false, None)]);
        h.controller.start(idle_events()).unwrap();
        assert_eq!(h.controller.active_page(), Some(3));

        h.controller.dispatch_button(PanelControl::PageDown, Edge::OnTurnedOn);
        assert_eq!(h.controller.active_page(), Some(5));
        h.controller.dispatch_button(PanelControl::PageDown, Edge::OnTurnedOff);
        assert_eq!(h.controller.active_page(), Some(5));
        h.controller.dispatch_button(PanelControl::PageUp, Edge::OnTurnedOn);
        h.controller.dispatch_button(PanelControl::PageUp, Edge::OnTurnedOn);
        assert_eq!(h.controller.active_page(), Some(7));

        h.controller.shutdown().await;
    }

    #[test]
    fn test_set_image_on_untracked_page() {
        let h = harness(vec![]);
        h.controller.set_image(99, Some(&image(640, 480)), "test").unwrap();

        assert!(h.controller.pages().is_empty());
        assert_eq!(
            h.device.calls(),
            vec![DeviceCall::SetImage {
                page: 99,
                len: 320 * 240 * 3,
                stride: 960
            }]
        );
        assert_eq!(h.device.image(99).unwrap().len(), 320 * 240 * 3);
    }

    #[test]
    fn test_set_image_without_source() {
        let h = harness(vec![]);
        assert!(h.controller.set_image(0, None, "test").is_err());
        assert!(h.device.calls().is_empty());
    }

    #[test]
    fn test_rejected_frame_is_dumped() {
        let h = harness(vec![]);
        h.device.fail_set_image(Some(DeviceStatus::Fail));

        let result = h.controller.set_image(1, Some(&image(320, 240)), "dial");
        assert!(matches!(result, Err(Error::Device(_))));

        assert_eq!(dump_count(h.dir.path()), 1);
    }

    fn dump_count(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_name()
                    .to_string_lossy()
                    .starts_with(diagnostics::ERROR_BITMAP_PREFIX)
            })
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_device_dumps_once_per_interval() {
        let h = harness(vec![page(0, true, None)]);
        h.device.fail_set_image(Some(DeviceStatus::Fail));
        h.controller.start(idle_events()).unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        let attempts = h
            .device
            .calls()
            .into_iter()
            .filter(|c| matches!(c, DeviceCall::SetImage { .. }))
            .count();
        assert!(attempts > 10);
        assert_eq!(dump_count(h.dir.path()), 1);

        tokio::time::sleep(Duration::from_secs(55)).await;
        assert_eq!(dump_count(h.dir.path()), 2);

        h.controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_loop_draws_active_page() {
        let h = harness(vec![page(0, false, None), page(1, true, None)]);
        h.controller.on_telemetry(0x10, 0x1234);
        h.controller.start(idle_events()).unwrap();

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(h.device.image(1).is_some());
        assert!(h.device.image(0).is_none());

        h.controller.shutdown().await;
    }

    #[tokio::test]
    async fn test_events_from_device_are_dispatched() {
        let h = harness(vec![page(0, true, None)]);
        let (sink, rx) = EventSink::channel(8);
        h.controller
            .set_protocol_binding(S1, Edge::OnTurnedOff, vec!["FLAPS UP".parse().unwrap()], "")
            .unwrap();
        h.controller.start(rx).unwrap();

        let bit = PanelControl::SoftButton1.mask_bit();
        assert!(sink.on_button_event(bit));
        assert!(sink.on_button_event(0));
        for _ in 0..50 {
            if !h.commands.sent().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(h.commands.sent(), vec!["FLAPS UP".parse().unwrap()]);

        h.controller.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let h = harness(vec![page(0, true, None)]);
        h.controller.start(idle_events()).unwrap();
        assert!(matches!(
            h.controller.start(idle_events()),
            Err(Error::InvalidState(_))
        ));
        h.controller.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_closes_everything() {
        let h = harness(vec![page(0, true, None), page(1, false, None)]);
        h.controller.start(idle_events()).unwrap();
        h.controller
            .set_key_binding(S1, Edge::OnTurnedOn, KeySequence::tap("A", Duration::from_millis(5)).unwrap(), "")
            .unwrap();
        let mut signals = h.controller.subscribe();

        h.controller.shutdown().await;

        assert_eq!(h.controller.state(), PanelState::Closed);
        assert!(h.controller.pages().is_empty());
        assert!(h.device.pages().is_empty());
        assert_eq!(h.controller.active_page(), None);
        assert!(h.controller.export_settings().is_empty());
        assert!(matches!(
            h.controller.set_key_binding(S1, Edge::OnTurnedOn, KeySequence::default(), ""),
            Err(Error::Closed)
        ));
        assert!(matches!(h.controller.add_page(4, false), Err(Error::Closed)));
        assert!(matches!(h.controller.import_settings(Vec::<String>::new()), Err(Error::Closed)));

        let mut seen = Vec::new();
        while let Ok(signal) = signals.try_recv() {
            seen.push(signal);
        }
        assert!(seen.contains(&PanelSignal::StateChanged(PanelState::Closed)));

        // Second shutdown is a no-op
        h.controller.shutdown().await;
    }

    #[tokio::test]
    async fn test_profile_survives_restart() {
        let h = harness(vec![page(0, true, None)]);
        h.controller
            .set_key_binding(S1, Edge::OnTurnedOn, KeySequence::tap("A", Duration::from_millis(50)).unwrap(), "flare")
            .unwrap();
        assert!(h.controller.is_dirty());
        assert_eq!(h.controller.save_profile().unwrap(), 1);
        assert!(!h.controller.is_dirty());

        let config = Config {
            state_dir: h.dir.path().join("state"),
            ..Config::default()
        };
        let profiles: Arc<dyn ProfileStore> = Arc::new(FileProfileStore::new(&config.state_dir));
        let restarted = Arc::new(PanelController::new(
            config,
            Arc::new(SimulatedDevice::new()),
            Arc::new(RecordingKeyEmitter::new()),
            Arc::new(RecordingCommandSink::default()),
            Some(profiles),
        ));
        restarted.start(idle_events()).unwrap();

        assert_eq!(restarted.export_settings(), h.controller.export_settings());
        assert!(!restarted.is_dirty());
        restarted.shutdown().await;
    }

    /// Profile store that runs a hook while saving.
    struct HookedStore {
        hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
        fail: bool,
    }

    impl ProfileStore for HookedStore {
        fn save(&self, _instance: &str, _records: &[String]) -> Result<()> {
            if let Some(hook) = self.hook.lock().unwrap().take() {
                hook();
            }
            if self.fail {
                return Err(Error::Io(std::io::Error::other("disk full")));
            }
            Ok(())
        }

        fn load(&self, _instance: &str) -> Result<Option<Vec<String>>> {
            Ok(None)
        }
    }

    fn hooked_controller(fail: bool) -> (Arc<PanelController>, Arc<HookedStore>) {
        let store = Arc::new(HookedStore {
            hook: Mutex::new(None),
            fail,
        });
        let profiles: Arc<dyn ProfileStore> = store.clone();
        let controller = Arc::new(PanelController::new(
            Config::default(),
            Arc::new(SimulatedDevice::new()),
            Arc::new(RecordingKeyEmitter::new()),
            Arc::new(RecordingCommandSink::default()),
            Some(profiles),
        ));
        (controller, store)
    }

    #[test]
    fn test_change_during_save_stays_dirty() {
        let (controller, store) = hooked_controller(false);
        controller
            .set_protocol_binding(S1, Edge::OnTurnedOn, vec!["GEAR 1".parse().unwrap()], "")
            .unwrap();

        let during = Arc::clone(&controller);
        *store.hook.lock().unwrap() = Some(Box::new(move || {
            during
                .set_protocol_binding(S1, Edge::OnTurnedOff, vec!["GEAR 0".parse().unwrap()], "")
                .unwrap();
        }));

        assert_eq!(controller.save_profile().unwrap(), 1);
        assert!(controller.is_dirty());
    }

    #[test]
    fn test_failed_save_stays_dirty() {
        let (controller, _store) = hooked_controller(true);
        controller
            .set_protocol_binding(S1, Edge::OnTurnedOn, vec!["GEAR 1".parse().unwrap()], "")
            .unwrap();

        assert!(matches!(controller.save_profile(), Err(Error::Io(_))));
        assert!(controller.is_dirty());
    }

    #[tokio::test]
    async fn test_binding_changes_are_signalled() {
        let h = harness(vec![]);
        let mut signals = h.controller.subscribe();
        h.controller.clear_bindings(S1).unwrap();
        assert_eq!(signals.try_recv().unwrap(), PanelSignal::SettingsChanged);
    }

    #[test]
    fn test_page_add_remove() {
        let h = harness(vec![]);
        assert_eq!(h.controller.add_page(4, true).unwrap(), AddOutcome::Added);
        assert_eq!(h.controller.add_page(4, false).unwrap(), AddOutcome::AlreadyTracked);
        assert_eq!(h.controller.active_page(), Some(4));
        assert_eq!(h.controller.remove_page(4).unwrap(), RemoveOutcome::Removed);
        assert_eq!(h.controller.remove_page(4).unwrap(), RemoveOutcome::NotTracked);
        assert_eq!(h.controller.active_page(), None);
    }

    #[test]
    fn test_telemetry_snapshot() {
        let h = harness(vec![]);
        h.controller.on_telemetry(1, 2);
        h.controller.on_telemetry(1, 3);
        assert_eq!(h.controller.telemetry_snapshot().get(1), Some(3));
    }
}
