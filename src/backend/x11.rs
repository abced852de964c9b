//! X11 window manager backend
//!
//! Enumerates EWMH clients, grabs window contents with `GetImage` and
//! applies layouts with `ConfigureWindow`. When the Composite extension is
//! present the root's children are redirected so obscured windows can still
//! be captured from their backing pixmap.

use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::errors::{ConnectionError, ReplyError, ReplyOrIdError};
use x11rb::protocol::ErrorKind;
use x11rb::protocol::composite::{self, ConnectionExt as CompositeExt, Redirect};
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;

use crate::backend::blocking::BlockingCaptures;
use crate::backend::{CaptureSource, GeometryApplier, WindowEnumerator};
use crate::constants::x11;
use crate::error::CaptureError;
use crate::layout::LayoutAssignment;
use crate::types::{PixelFormat, RawImage, Rect, WindowId, WindowInfo};

/// Pre-cached X11 atoms to avoid repeated roundtrips
#[derive(Debug, Clone, Copy)]
pub struct CachedAtoms {
    pub net_client_list: Atom,
    pub net_wm_name: Atom,
    pub utf8_string: Atom,
    pub wm_name: Atom,
    pub net_wm_state: Atom,
    pub net_wm_state_hidden: Atom,
    pub net_active_window: Atom,
}

impl CachedAtoms {
    pub fn new(conn: &RustConnection) -> Result<Self> {
        // Do all intern_atom roundtrips once at startup
        Ok(Self {
            net_client_list: intern(conn, "_NET_CLIENT_LIST")?,
            net_wm_name: intern(conn, "_NET_WM_NAME")?,
            utf8_string: intern(conn, "UTF8_STRING")?,
            wm_name: intern(conn, "WM_NAME")?,
            net_wm_state: intern(conn, "_NET_WM_STATE")?,
            net_wm_state_hidden: intern(conn, "_NET_WM_STATE_HIDDEN")?,
            net_active_window: intern(conn, "_NET_ACTIVE_WINDOW")?,
        })
    }
}

fn intern(conn: &RustConnection, name: &str) -> Result<Atom> {
    Ok(conn
        .intern_atom(false, name.as_bytes())
        .with_context(|| format!("Failed to intern {name} atom"))?
        .reply()
        .with_context(|| format!("Failed to get reply for {name} atom"))?
        .atom)
}

pub struct X11Backend {
    conn: Arc<RustConnection>,
    root: Window,
    screen: Rect,
    atoms: CachedAtoms,
    composite: bool,
    captures: BlockingCaptures<RawImage>,
}

impl X11Backend {
    /// Connect to `display` (or `$DISPLAY`)
    pub fn connect(display: Option<&str>) -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(display).context("Failed to connect to X11 server")?;
        let setup = conn.setup();
        anyhow::ensure!(
            setup.image_byte_order == ImageOrder::LSB_FIRST,
            "X11 server uses MSB-first image byte order, which is not supported"
        );

        let screen = &setup.roots[screen_num];
        let root = screen.root;
        let screen_rect = Rect::new(0, 0, screen.width_in_pixels as u32, screen.height_in_pixels as u32);
        info!("successfully connected to x11: screen={screen_num}, dimensions={screen_rect}");

        let atoms = CachedAtoms::new(&conn)?;
        let composite = Self::redirect_subwindows(&conn, root)?;

        Ok(Self {
            conn: Arc::new(conn),
            root,
            screen: screen_rect,
            atoms,
            composite,
            captures: BlockingCaptures::new(),
        })
    }

    fn redirect_subwindows(conn: &RustConnection, root: Window) -> Result<bool> {
        let present = conn
            .extension_information(composite::X11_EXTENSION_NAME)
            .context("Failed to query Composite extension")?
            .is_some();
        if !present {
            warn!("Composite extension missing, obscured windows will capture as covered");
            return Ok(false);
        }
        conn.composite_query_version(0, 4)
            .context("Failed to query Composite version")?
            .reply()
            .context("Failed to get Composite version reply")?;
        conn.composite_redirect_subwindows(root, Redirect::AUTOMATIC)
            .context("Failed to redirect subwindows of root")?;
        conn.flush().context("Failed to flush X11 connection after redirect")?;
        debug!("Composite redirect enabled");
        Ok(true)
    }

    /// Root window geometry, the area layouts are computed over
    pub fn screen_rect(&self) -> Rect {
        self.screen
    }

    fn client_list(&self) -> Result<Vec<Window>> {
        let reply = self
            .conn
            .get_property(
                false,
                self.root,
                self.atoms.net_client_list,
                AtomEnum::WINDOW,
                0,
                x11::CLIENT_LIST_MAX_LENGTH,
            )
            .context("Failed to query _NET_CLIENT_LIST")?
            .reply()
            .context("Failed to get _NET_CLIENT_LIST reply")?;
        Ok(reply.value32().map(Iterator::collect).unwrap_or_default())
    }

    fn active_window(&self) -> Result<Option<Window>> {
        let reply = self
            .conn
            .get_property(false, self.root, self.atoms.net_active_window, AtomEnum::WINDOW, 0, 1)
            .context("Failed to query _NET_ACTIVE_WINDOW property")?
            .reply()
            .context("Failed to get reply for _NET_ACTIVE_WINDOW query")?;
        Ok(reply.value32().and_then(|mut values| values.next()).filter(|&w| w != x11rb::NONE))
    }

    fn title(&self, window: Window) -> Result<String> {
        let utf8 = self
            .conn
            .get_property(
                false,
                window,
                self.atoms.net_wm_name,
                self.atoms.utf8_string,
                0,
                x11::PROPERTY_MAX_LENGTH,
            )
            .with_context(|| format!("Failed to query _NET_WM_NAME for window {window}"))?
            .reply()
            .with_context(|| format!("Failed to get _NET_WM_NAME reply for window {window}"))?;
        if !utf8.value.is_empty() {
            return Ok(decode_title(&utf8.value));
        }

        let legacy = self
            .conn
            .get_property(
                false,
                window,
                self.atoms.wm_name,
                AtomEnum::STRING,
                0,
                x11::PROPERTY_MAX_LENGTH,
            )
            .with_context(|| format!("Failed to query WM_NAME for window {window}"))?
            .reply()
            .with_context(|| format!("Failed to get WM_NAME reply for window {window}"))?;
        Ok(decode_title(&legacy.value))
    }

    fn is_hidden(&self, window: Window) -> Result<bool> {
        let reply = self
            .conn
            .get_property(
                false,
                window,
                self.atoms.net_wm_state,
                AtomEnum::ATOM,
                0,
                x11::PROPERTY_MAX_LENGTH,
            )
            .with_context(|| format!("Failed to query _NET_WM_STATE for window {window}"))?
            .reply()
            .with_context(|| format!("Failed to get _NET_WM_STATE reply for window {window}"))?;
        Ok(reply
            .value32()
            .is_some_and(|mut states| states.any(|state| state == self.atoms.net_wm_state_hidden)))
    }

    /// Absolute geometry; `GetGeometry` alone is relative to the WM frame
    fn geometry(&self, window: Window) -> Result<Rect> {
        let geometry = self
            .conn
            .get_geometry(window)
            .with_context(|| format!("Failed to query geometry for window {window}"))?
            .reply()
            .with_context(|| format!("Failed to get geometry reply for window {window}"))?;
        let origin = self
            .conn
            .translate_coordinates(window, self.root, 0, 0)
            .with_context(|| format!("Failed to translate coordinates for window {window}"))?
            .reply()
            .with_context(|| format!("Failed to get coordinate reply for window {window}"))?;
        Ok(Rect::new(
            origin.dst_x as i32,
            origin.dst_y as i32,
            geometry.width as u32,
            geometry.height as u32,
        ))
    }

    fn window_info(&self, window: Window, active: Option<Window>) -> Result<WindowInfo> {
        Ok(WindowInfo {
            id: WindowId(window),
            title: self.title(window)?,
            geometry: self.geometry(window)?,
            minimized: self.is_hidden(window)?,
            active: active == Some(window),
        })
    }
}

impl WindowEnumerator for X11Backend {
    fn list_windows(&self) -> Result<Vec<WindowInfo>> {
        let active = self.active_window()?;
        let mut windows = Vec::new();
        for window in self.client_list()? {
            // Clients may vanish between the list and the per-window queries
            match self.window_info(window, active) {
                Ok(info) => windows.push(info),
                Err(e) => debug!(window = %WindowId(window), error = %e, "Skipping window"),
            }
        }
        Ok(windows)
    }
}

impl CaptureSource for X11Backend {
    fn capture(&self, window: WindowId) -> impl Future<Output = Result<RawImage, CaptureError>> + Send {
        let conn = Arc::clone(&self.conn);
        let composite = self.composite;
        self.captures.run(window, move || grab(&conn, window.0, composite))
    }
}

impl GeometryApplier for X11Backend {
    fn apply(&self, assignment: &LayoutAssignment) -> Result<()> {
        for (window, rect) in assignment.placements() {
            self.conn
                .configure_window(
                    window.0,
                    &ConfigureWindowAux::new()
                        .x(rect.x)
                        .y(rect.y)
                        .width(rect.width)
                        .height(rect.height),
                )
                .with_context(|| format!("Failed to move window {window} to {rect}"))?;
            debug!(window = %window, rect = %rect, "Applied placement");
        }
        self.conn
            .flush()
            .context("Failed to flush X11 connection after applying layout")?;
        Ok(())
    }
}

/// Blocking grab of one window's pixels
fn grab(conn: &RustConnection, window: Window, composite: bool) -> Result<RawImage, CaptureError> {
    let attributes = conn
        .get_window_attributes(window)
        .map_err(lost_connection)?
        .reply()
        .map_err(classify_reply_error)?;
    if attributes.map_state != MapState::VIEWABLE {
        return Err(CaptureError::Unavailable("window not viewable".to_string()));
    }

    let geometry = conn
        .get_geometry(window)
        .map_err(lost_connection)?
        .reply()
        .map_err(classify_reply_error)?;
    if geometry.width == 0 || geometry.height == 0 {
        return Err(CaptureError::Unavailable("window has zero size".to_string()));
    }

    let pixmap = if composite {
        let pixmap = conn.generate_id().map_err(|e| match e {
            ReplyOrIdError::ConnectionError(e) => lost_connection(e),
            other => CaptureError::Failed(other.to_string()),
        })?;
        conn.composite_name_window_pixmap(window, pixmap)
            .map_err(lost_connection)?;
        Some(pixmap)
    } else {
        None
    };

    let image = conn
        .get_image(
            ImageFormat::Z_PIXMAP,
            pixmap.unwrap_or(window),
            0,
            0,
            geometry.width,
            geometry.height,
            x11::ALL_PLANES,
        )
        .map_err(lost_connection)
        .and_then(|cookie| cookie.reply().map_err(classify_reply_error));

    if let Some(pixmap) = pixmap {
        let _ = conn.free_pixmap(pixmap);
    }
    let image = image?;

    if image.depth != x11::TRUECOLOR_DEPTH && image.depth != x11::ARGB_DEPTH {
        return Err(CaptureError::Failed(format!("unsupported visual depth {}", image.depth)));
    }

    RawImage::new(
        geometry.width as u32,
        geometry.height as u32,
        PixelFormat::Bgra8,
        image.data,
    )
    .map_err(|e| CaptureError::Failed(e.to_string()))
}

fn lost_connection(error: ConnectionError) -> CaptureError {
    CaptureError::ToolUnavailable(format!("X11 connection error: {error}"))
}

fn classify_reply_error(error: ReplyError) -> CaptureError {
    match error {
        ReplyError::ConnectionError(e) => lost_connection(e),
        ReplyError::X11Error(e) => match e.error_kind {
            ErrorKind::Window | ErrorKind::Drawable => CaptureError::WindowGone,
            ErrorKind::Match => CaptureError::Unavailable("window not viewable".to_string()),
            ErrorKind::Access => CaptureError::PermissionDenied(format!("{:?}", e.error_kind)),
            kind => CaptureError::Failed(format!("X11 error {kind:?}")),
        },
    }
}

/// Window title bytes as text; some clients pad with NULs
fn decode_title(bytes: &[u8]) -> String {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |last| last + 1);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
