//! Item thumbnails: proxied image fetches, decoding, and an LRU texture cache

use std::collections::{HashMap, HashSet, VecDeque};

use super::api::ContentItem;
use super::loader::HttpLoader;

/// Longest edge a decoded thumbnail is scaled down to
pub const MAX_THUMBNAIL_EDGE: u32 = 256;

/// Decoded thumbnail uploaded to egui
pub struct Thumbnail {
    pub texture: egui::TextureHandle,
    pub memory_size: usize,
}

/// LRU cache of thumbnail textures bounded by decoded size
pub struct ThumbnailCache {
    thumbs: HashMap<String, Thumbnail>,
    access_order: VecDeque<String>,
    current_memory: usize,
    max_memory: usize,
}

impl ThumbnailCache {
    /// - max_memory: upper bound on RGBA bytes held (e.g., 96MB)
    pub fn new(max_memory: usize) -> Self {
        Self {
            thumbs: HashMap::new(),
            access_order: VecDeque::new(),
            current_memory: 0,
            max_memory,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.thumbs.contains_key(id)
    }

    /// Get a thumbnail's texture, marking it recently used
    pub fn get(&mut self, id: &str) -> Option<egui::TextureId> {
        let texture = self.thumbs.get(id)?.texture.id();
        self.update_access_order(id);
        Some(texture)
    }

    /// Insert a thumbnail, evicting least recently used ones to fit
    pub fn insert(&mut self, id: String, thumb: Thumbnail) {
        if let Some(old) = self.thumbs.remove(&id) {
            self.current_memory -= old.memory_size;
            self.access_order.retain(|other| other != &id);
        }

        while !self.thumbs.is_empty() && self.current_memory + thumb.memory_size > self.max_memory {
            if !self.evict_oldest() {
                break;
            }
        }

        self.current_memory += thumb.memory_size;
        self.thumbs.insert(id.clone(), thumb);
        self.access_order.push_back(id);
    }

    fn evict_oldest(&mut self) -> bool {
        let Some(oldest) = self.access_order.pop_front() else {
            return false;
        };
        if let Some(thumb) = self.thumbs.remove(&oldest) {
            self.current_memory -= thumb.memory_size;
            log::debug!("Evicted thumbnail {}", oldest);
        }
        true
    }

    fn update_access_order(&mut self, id: &str) {
        if let Some(pos) = self.access_order.iter().position(|other| other == id) {
            if let Some(key) = self.access_order.remove(pos) {
                self.access_order.push_back(key);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.thumbs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thumbs.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            thumb_count: self.thumbs.len(),
            memory_used: self.current_memory,
            max_memory: self.max_memory,
        }
    }
}

/// Cache statistics for debugging/UI
#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    pub thumb_count: usize,
    pub memory_used: usize,
    pub max_memory: usize,
}

impl CacheStats {
    pub fn memory_usage_percent(&self) -> f32 {
        if self.max_memory == 0 {
            0.0
        } else {
            (self.memory_used as f32 / self.max_memory as f32) * 100.0
        }
    }
}

/// Fetches item images through the image proxy and keeps them as textures
pub struct ThumbnailLoader {
    loader: HttpLoader<String>,
    proxy_base: String,
    cache: ThumbnailCache,
    /// Items whose image could not be fetched or decoded this session
    failed: HashSet<String>,
}

impl ThumbnailLoader {
    pub fn new(proxy_base: &str, user_agent: &str, max_memory: usize) -> Self {
        Self {
            loader: HttpLoader::new(user_agent, 4),
            proxy_base: proxy_base.to_string(),
            cache: ThumbnailCache::new(max_memory),
            failed: HashSet::new(),
        }
    }

    /// Ask for an item's thumbnail unless it is cached, loading, or known bad
    pub fn request(&mut self, item: &ContentItem) {
        let Some(image_url) = item.image_url.as_deref() else {
            return;
        };
        if self.cache.contains(&item.id)
            || self.loader.is_loading(&item.id)
            || self.failed.contains(&item.id)
        {
            return;
        }
        match proxy_url(&self.proxy_base, image_url) {
            Some(url) => {
                self.loader.request(item.id.clone(), url);
            }
            None => {
                log::warn!("Unusable image URL for item {}: {}", item.id, image_url);
                self.failed.insert(item.id.clone());
            }
        }
    }

    /// Decode finished downloads and upload them. Returns how many arrived.
    pub fn update(&mut self, ctx: &egui::Context) -> usize {
        let mut uploaded = 0;
        while let Some((id, result)) = self.loader.poll() {
            let image = match result {
                Ok(bytes) => decode_thumbnail(&bytes).map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            match image {
                Ok(image) => {
                    let memory_size = image.width() * image.height() * 4;
                    let texture =
                        ctx.load_texture(format!("thumb-{id}"), image, egui::TextureOptions::LINEAR);
                    self.cache.insert(
                        id,
                        Thumbnail {
                            texture,
                            memory_size,
                        },
                    );
                    uploaded += 1;
                }
                Err(e) => {
                    log::warn!("Failed to load thumbnail {}: {}", id, e);
                    self.failed.insert(id);
                }
            }
        }
        uploaded
    }

    pub fn texture(&mut self, id: &str) -> Option<egui::TextureId> {
        self.cache.get(id)
    }

    pub fn pending_count(&self) -> usize {
        self.loader.pending_count()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

/// Image proxy URL for a remote image
#[cfg(not(target_arch = "wasm32"))]
pub fn proxy_url(proxy_base: &str, image_url: &str) -> Option<String> {
    let endpoint = format!("{}/api/image-proxy", proxy_base.trim_end_matches('/'));
    reqwest::Url::parse_with_params(&endpoint, &[("url", image_url)])
        .ok()
        .map(|url| url.to_string())
}

/// Image proxy URL for a remote image
#[cfg(target_arch = "wasm32")]
pub fn proxy_url(proxy_base: &str, image_url: &str) -> Option<String> {
    let encoded: String = js_sys::encode_uri_component(image_url).into();
    Some(format!(
        "{}/api/image-proxy?url={}",
        proxy_base.trim_end_matches('/'),
        encoded
    ))
}

/// Decode image bytes into an egui image no larger than the thumbnail edge
pub fn decode_thumbnail(data: &[u8]) -> Result<egui::ColorImage, image::ImageError> {
    let mut img = image::load_from_memory(data)?;
    if img.width() > MAX_THUMBNAIL_EDGE || img.height() > MAX_THUMBNAIL_EDGE {
        img = img.thumbnail(MAX_THUMBNAIL_EDGE, MAX_THUMBNAIL_EDGE);
    }
    let rgba = img.to_rgba8();
    let size = [rgba.width() as usize, rgba.height() as usize];
    Ok(egui::ColorImage::from_rgba_unmultiplied(size, rgba.as_raw()))
}
