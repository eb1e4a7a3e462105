use std::cmp::Ordering;
use std::path::Path;

use crate::media::SupportedImage;

/// Reads pixel dimensions of an image without decoding it fully.
pub trait ImageProbe: Send + Sync {
    fn dimensions(&self, path: &Path) -> Option<(u32, u32)>;
}

/// [`ImageProbe`] that reads the image header with the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderProbe;

impl ImageProbe for HeaderProbe {
    fn dimensions(&self, path: &Path) -> Option<(u32, u32)> {
        match image::image_dimensions(path) {
            Ok(dims) => Some(dims),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "could not read image dimensions");
                None
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artwork {
    Poster(SupportedImage),
    PosterAndFanart {
        poster: SupportedImage,
        fanart: SupportedImage,
        /// Candidates beyond the first two, left untouched.
        ignored: Vec<SupportedImage>,
    },
}

pub struct PosterFanartSelector<'a> {
    probe: &'a dyn ImageProbe,
}

impl<'a> PosterFanartSelector<'a> {
    pub fn new(probe: &'a dyn ImageProbe) -> Self {
        Self { probe }
    }

    /// Assign poster and fanart roles. `None` for an empty candidate list.
    ///
    /// Only the first two candidates are compared. A portrait or square image
    /// beats a wide one; with equal orientation the narrower aspect ratio is
    /// the poster. Ties and unreadable images fall back to file name order.
    pub fn select(&self, candidates: &[SupportedImage]) -> Option<Artwork> {
        match candidates {
            [] => None,
            [only] => Some(Artwork::Poster(only.clone())),
            [a, b, rest @ ..] => {
                let (poster, fanart) = match self.compare(a, b) {
                    Ordering::Less => (a, b),
                    Ordering::Greater => (b, a),
                    Ordering::Equal => {
                        if a.file_name() <= b.file_name() {
                            (a, b)
                        } else {
                            (b, a)
                        }
                    }
                };
                if !rest.is_empty() {
                    tracing::warn!(count = rest.len(), "more than two images, extra images are ignored");
                }
                Some(Artwork::PosterAndFanart {
                    poster: poster.clone(),
                    fanart: fanart.clone(),
                    ignored: rest.to_vec(),
                })
            }
        }
    }

    /// `Less` when `a` is the better poster.
    fn compare(&self, a: &SupportedImage, b: &SupportedImage) -> Ordering {
        let (Some(da), Some(db)) = (self.probe.dimensions(a.path()), self.probe.dimensions(b.path())) else {
            return Ordering::Equal;
        };
        if da.0 == 0 || da.1 == 0 || db.0 == 0 || db.1 == 0 {
            return Ordering::Equal;
        }
        let portrait_a = da.1 >= da.0;
        let portrait_b = db.1 >= db.0;
        if portrait_a != portrait_b {
            return if portrait_a { Ordering::Less } else { Ordering::Greater };
        }
        // compare w_a/h_a with w_b/h_b without floating point
        let lhs = u64::from(da.0) * u64::from(db.1);
        let rhs = u64::from(db.0) * u64::from(da.1);
        lhs.cmp(&rhs)
    }
}
