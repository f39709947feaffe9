// provider.rs — 全景图来源（后台线程加载 / 合成占位图）
//
// request_image 不能阻塞：结果通过 mpsc 通道送回，由 NavigationManager::poll 取走。

use crate::error::{Result, TourError};
use crate::navigation::Room;
use crate::panorama::PanoramaImage;
use image::io::Reader as ImageReader;
use image::{GenericImageView, Rgba, RgbaImage};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Sender};
use std::sync::Arc;
use std::thread;

pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub ticket: u64,
    pub room: Room,
}

#[derive(Debug)]
pub struct ImageResponse {
    pub ticket: u64,
    pub room_id: String,
    pub result: Result<PanoramaImage>,
}

impl ImageResponse {
    pub fn for_request(request: &ImageRequest, result: Result<PanoramaImage>) -> Self {
        Self {
            ticket: request.ticket,
            room_id: request.room.id.clone(),
            result,
        }
    }
}

/// Supplies the equirectangular image for a room.
///
/// Implementations answer exactly once on `reply`, either before returning
/// (inline) or later from another thread. They must never block the caller.
pub trait ImageProvider {
    fn request_image(&self, request: ImageRequest, reply: Sender<ImageResponse>);
}

impl<P: ImageProvider + ?Sized> ImageProvider for Box<P> {
    fn request_image(&self, request: ImageRequest, reply: Sender<ImageResponse>) {
        (**self).request_image(request, reply)
    }
}

impl<P: ImageProvider + ?Sized> ImageProvider for Arc<P> {
    fn request_image(&self, request: ImageRequest, reply: Sender<ImageResponse>) {
        (**self).request_image(request, reply)
    }
}

fn send_reply(reply: &Sender<ImageResponse>, response: ImageResponse) {
    if reply.send(response).is_err() {
        log::debug!("viewer went away before the panorama arrived");
    }
}

/// Runs `job` on a fresh thread and ships its result back.
fn spawn_load<F>(request: ImageRequest, reply: Sender<ImageResponse>, job: F)
where
    F: FnOnce(&Room) -> Result<PanoramaImage> + Send + 'static,
{
    let name = format!("pano-load-{}", request.ticket);
    // spawn 失败时 request/reply 仍需可用，所以先克隆一份
    let fallback = (request.clone(), reply.clone());
    let spawned = thread::Builder::new().name(name).spawn(move || {
        let result = job(&request.room);
        send_reply(&reply, ImageResponse::for_request(&request, result));
    });
    if let Err(e) = spawned {
        let (request, reply) = fallback;
        let err = TourError::load_failure(request.room.id.clone(), format!("cannot start loader: {e}"));
        send_reply(&reply, ImageResponse::for_request(&request, Err(err)));
    }
}

/// Adapts any loader function into a background provider.
pub struct ThreadedProvider<F> {
    load: Arc<F>,
}

impl<F> ThreadedProvider<F>
where
    F: Fn(&Room) -> Result<PanoramaImage> + Send + Sync + 'static,
{
    pub fn new(load: F) -> Self {
        Self { load: Arc::new(load) }
    }
}

impl<F> ImageProvider for ThreadedProvider<F>
where
    F: Fn(&Room) -> Result<PanoramaImage> + Send + Sync + 'static,
{
    fn request_image(&self, request: ImageRequest, reply: Sender<ImageResponse>) {
        let load = Arc::clone(&self.load);
        spawn_load(request, reply, move |room| load(room));
    }
}

/// Reads `<dir>/<room id>.<ext>` on a background thread.
#[derive(Debug, Clone)]
pub struct FileImageProvider {
    dir: PathBuf,
    max_dimension: u32,
}

impl FileImageProvider {
    pub fn new(dir: impl Into<PathBuf>, max_dimension: u32) -> Self {
        Self {
            dir: dir.into(),
            max_dimension,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn find_image(&self, room_id: &str) -> Option<PathBuf> {
        IMAGE_EXTENSIONS
            .iter()
            .map(|ext| self.dir.join(format!("{room_id}.{ext}")))
            .find(|p| p.is_file())
    }
}

impl ImageProvider for FileImageProvider {
    fn request_image(&self, request: ImageRequest, reply: Sender<ImageResponse>) {
        let path = self.find_image(&request.room.id);
        let dir = self.dir.clone();
        let max_dimension = self.max_dimension;
        spawn_load(request, reply, move |room| {
            let path = path.ok_or_else(|| {
                TourError::load_failure(&room.id, format!("no image for this room in {}", dir.display()))
            })?;
            load_panorama_file(&path, &room.id, max_dimension)
                .map_err(|e| TourError::load_failure(&room.id, e))
        });
    }
}

/// Decodes an image file (format guessed from content, no size limits).
pub fn load_panorama_file(path: &Path, room_id: &str, max_dimension: u32) -> Result<PanoramaImage> {
    log::info!("loading panorama {} in background", path.display());
    let reader = BufReader::new(File::open(path)?);
    let mut reader = ImageReader::new(reader).with_guessed_format()?;
    reader.no_limits();
    let img = reader.decode()?;
    let (w, h) = img.dimensions();
    log::info!("decoded {} ({w}x{h})", path.display());
    Ok(PanoramaImage::normalized(room_id, img.to_rgba8(), max_dimension))
}

/// Answers inline with a generated placeholder room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntheticImageProvider {
    pub width: u32,
    pub height: u32,
}

impl Default for SyntheticImageProvider {
    fn default() -> Self {
        Self::new(1024, 512)
    }
}

impl SyntheticImageProvider {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl ImageProvider for SyntheticImageProvider {
    fn request_image(&self, request: ImageRequest, reply: Sender<ImageResponse>) {
        let image = synthesize_room(&request.room.id, self.width, self.height);
        send_reply(&reply, ImageResponse::for_request(&request, Ok(image)));
    }
}

const SKY: [u8; 3] = [0x87, 0xCE, 0xEB];
const PALE_GREEN: [u8; 3] = [0x98, 0xFB, 0x98];
const SEA_GREEN: [u8; 3] = [0x8F, 0xBC, 0x8F];
const TAN: [u8; 3] = [0xD2, 0xB4, 0x8C];

/// Sky-to-grass gradient with a floor block and three windows.
pub fn synthesize_room(room_id: &str, width: u32, height: u32) -> PanoramaImage {
    let (w, h) = (width as f32, height as f32);
    let img = RgbaImage::from_fn(width, height, |x, y| {
        let (fx, fy) = (x as f32, y as f32);

        let in_floor = fx >= w * 0.2 && fx < w * 0.8 && fy >= h * 0.6;
        let in_window = fy >= h * 0.2
            && fy < h * 0.5
            && (0..3).any(|i| {
                let left = w * (0.3 + i as f32 * 0.2);
                fx >= left && fx < left + w * 0.1
            });

        let rgb = if in_floor {
            TAN
        } else if in_window {
            SKY
        } else {
            gradient(if height > 1 { fy / (h - 1.0) } else { 0.0 })
        };
        Rgba([rgb[0], rgb[1], rgb[2], 255])
    });
    PanoramaImage::new(room_id, img)
}

// 0 → 天蓝，0.7 → 淡绿，1 → 暗海绿
fn gradient(t: f32) -> [u8; 3] {
    let (a, b, local) = if t < 0.7 {
        (SKY, PALE_GREEN, t / 0.7)
    } else {
        (PALE_GREEN, SEA_GREEN, (t - 0.7) / 0.3)
    };
    let lerp = |i: usize| (a[i] as f32 + (b[i] as f32 - a[i] as f32) * local.clamp(0.0, 1.0)).round() as u8;
    [lerp(0), lerp(1), lerp(2)]
}

/// Asks `primary` first and falls back to `secondary` when it fails.
pub struct FallbackProvider<A, B> {
    primary: A,
    secondary: Arc<B>,
}

impl<A, B> FallbackProvider<A, B> {
    pub fn new(primary: A, secondary: B) -> Self {
        Self {
            primary,
            secondary: Arc::new(secondary),
        }
    }
}

impl<A, B> ImageProvider for FallbackProvider<A, B>
where
    A: ImageProvider,
    B: ImageProvider + Send + Sync + 'static,
{
    fn request_image(&self, request: ImageRequest, reply: Sender<ImageResponse>) {
        let (tx, rx) = channel();
        self.primary.request_image(request.clone(), tx);
        let secondary = Arc::clone(&self.secondary);
        let spawned = thread::Builder::new()
            .name(format!("pano-fallback-{}", request.ticket))
            .spawn(move || match rx.recv() {
                Ok(ImageResponse { result: Err(e), .. }) => {
                    log::warn!("{e}; using fallback panorama");
                    secondary.request_image(request, reply);
                }
                Ok(response) => send_reply(&reply, response),
                Err(_) => secondary.request_image(request, reply),
            });
        if let Err(e) = spawned {
            log::warn!("cannot start fallback watcher: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use std::time::Duration;

    fn request(id: &str) -> ImageRequest {
        ImageRequest {
            ticket: 7,
            room: Room::new(id, "Room", Vec3::ZERO),
        }
    }

    #[test]
    fn synthetic_room_matches_the_placeholder_layout() {
        let pano = synthesize_room("r", 100, 50);
        assert_eq!(pano.texel(0, 0), [0x87, 0xCE, 0xEB, 255]);
        assert_eq!(pano.texel(50, 45), [0xD2, 0xB4, 0x8C, 255]);
        assert_eq!(pano.texel(32, 15), [0x87, 0xCE, 0xEB, 255]);
        assert_eq!(pano.texel(5, 49), [0x8F, 0xBC, 0x8F, 255]);
    }

    #[test]
    fn synthetic_provider_answers_inline() {
        let (tx, rx) = channel();
        SyntheticImageProvider::new(16, 8).request_image(request("den"), tx);
        let response = rx.try_recv().unwrap();
        assert_eq!(response.ticket, 7);
        assert_eq!(response.room_id, "den");
        assert_eq!(response.result.unwrap().room_id(), "den");
    }

    #[test]
    fn threaded_provider_answers_from_another_thread() {
        let provider = ThreadedProvider::new(|room: &Room| Ok(synthesize_room(&room.id, 8, 4)));
        let (tx, rx) = channel();
        provider.request_image(request("attic"), tx);
        let response = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(response.room_id, "attic");
        assert!(response.result.is_ok());
    }

    #[test]
    fn missing_file_is_a_load_failure() {
        let dir = std::env::temp_dir().join("panorama_tour_missing_images");
        let provider = FileImageProvider::new(&dir, 4096);
        let (tx, rx) = channel();
        provider.request_image(request("nowhere"), tx);
        let response = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(response.result, Err(TourError::ImageLoadFailure { .. })));
    }

    #[test]
    fn file_provider_decodes_room_images() {
        let dir = std::env::temp_dir().join(format!("panorama_tour_images_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        RgbaImage::from_pixel(8, 4, Rgba([9, 8, 7, 255]))
            .save(dir.join("kitchen.png"))
            .unwrap();

        let provider = FileImageProvider::new(&dir, 4096);
        let (tx, rx) = channel();
        provider.request_image(request("kitchen"), tx);
        let image = rx.recv_timeout(Duration::from_secs(5)).unwrap().result.unwrap();
        assert_eq!((image.width(), image.height()), (8, 4));
        assert_eq!(image.texel(3, 2), [9, 8, 7, 255]);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn fallback_kicks_in_after_failure() {
        let failing = ThreadedProvider::new(|room: &Room| Err(TourError::load_failure(&room.id, "nope")));
        let provider = FallbackProvider::new(failing, SyntheticImageProvider::new(8, 4));
        let (tx, rx) = channel();
        provider.request_image(request("cellar"), tx);
        let response = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(response.ticket, 7);
        assert!(response.result.is_ok());
    }
}
