use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::{AlbumMetadata, ComicId};
use crate::error::ShelfError;
use crate::remote::ContentClient;
use crate::store::RecordStore;

#[derive(Debug, Clone, Serialize)]
pub struct AlbumDownload {
    pub id: String,
    pub dir: Utf8PathBuf,
    pub images: usize,
}

/// Retrieves album metadata and cover for `remote_id` into the record
/// directory of `id`, overwriting both files.
///
/// The metadata file is written before the cover is fetched. If the cover
/// step fails the metadata stays on disk and the call still reports failure.
pub fn fetch_detail(
    client: &dyn ContentClient,
    store: &RecordStore,
    id: &ComicId,
    remote_id: &ComicId,
    sink: &dyn ProgressSink,
) -> Result<(), ShelfError> {
    store.ensure_record_dir(id)?;

    sink.event(ProgressEvent {
        message: format!("phase=Fetch; album {remote_id}"),
        elapsed: None,
    });
    let start = Instant::now();
    let album = client.album_detail(remote_id)?;
    sink.event(ProgressEvent {
        message: format!("remote.response album={remote_id}"),
        elapsed: Some(start.elapsed()),
    });
    let metadata = AlbumMetadata::from(&album);
    store.write_metadata(id, &metadata)?;

    sink.event(ProgressEvent {
        message: format!("phase=Fetch; cover {remote_id}"),
        elapsed: None,
    });
    let photo = client.photo_detail(remote_id)?;
    let cover = photo
        .first()
        .ok_or_else(|| ShelfError::EmptyPhoto(remote_id.to_string()))?;
    download_atomic(client, cover, &store.cover_path(id))?;

    tracing::info!(id = %id, title = %metadata.display_title(), "fetched comic detail");
    sink.event(ProgressEvent {
        message: format!("phase=Store; saved {id}"),
        elapsed: Some(start.elapsed()),
    });
    Ok(())
}

/// Downloads every image of the photo set into `dest_root/<id>/`, numbered
/// from `00001`.
pub fn download_album(
    client: &dyn ContentClient,
    id: &ComicId,
    dest_root: &Utf8Path,
    sink: &dyn ProgressSink,
) -> Result<AlbumDownload, ShelfError> {
    sink.event(ProgressEvent {
        message: format!("phase=Resolve; photo set {id}"),
        elapsed: None,
    });
    let photo = client.photo_detail(id)?;
    if photo.images.is_empty() {
        return Err(ShelfError::EmptyPhoto(id.to_string()));
    }

    let dir = dest_root.join(id.as_str());
    let start = Instant::now();
    let total = photo.images.len();
    for (index, image) in photo.images.iter().enumerate() {
        let path = dir.join(format!("{:05}.{}", index + 1, image.extension()));
        download_atomic(client, image, &path)?;
        sink.event(ProgressEvent {
            message: format!("phase=Fetch; image {}/{total}", index + 1),
            elapsed: Some(start.elapsed()),
        });
    }

    tracing::info!(id = %id, images = total, dir = %dir, "downloaded album");
    Ok(AlbumDownload {
        id: id.to_string(),
        dir,
        images: total,
    })
}

// The client writes into a temp file next to the target, which is then
// renamed into place.
fn download_atomic(
    client: &dyn ContentClient,
    image: &crate::remote::ImageRef,
    destination: &Utf8Path,
) -> Result<(), ShelfError> {
    let parent = destination
        .parent()
        .ok_or_else(|| ShelfError::Filesystem(format!("invalid destination {destination}")))?;
    std::fs::create_dir_all(parent.as_std_path())
        .map_err(|err| ShelfError::Filesystem(format!("create {parent}: {err}")))?;
    let temp = tempfile::Builder::new()
        .prefix(".comic-shelf-image")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| ShelfError::Filesystem(err.to_string()))?;
    client.download_image(image, temp.path())?;
    temp.persist(destination.as_std_path())
        .map_err(|err| ShelfError::Filesystem(format!("persist {destination}: {}", err.error)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::output::JsonOutput;
    use crate::remote::{ImageRef, PhotoDetail, RemoteAlbum};

    struct PagesClient {
        pages: usize,
    }

    impl ContentClient for PagesClient {
        fn album_detail(&self, id: &ComicId) -> Result<RemoteAlbum, ShelfError> {
            Ok(RemoteAlbum {
                album_id: id.to_string(),
                ..RemoteAlbum::default()
            })
        }

        fn photo_detail(&self, _id: &ComicId) -> Result<PhotoDetail, ShelfError> {
            Ok(PhotoDetail {
                photo_id: String::new(),
                images: (0..self.pages)
                    .map(|i| ImageRef {
                        url: format!("https://cdn.example.org/{i}.jpg"),
                        filename: None,
                    })
                    .collect(),
            })
        }

        fn download_image(&self, image: &ImageRef, destination: &Path) -> Result<(), ShelfError> {
            std::fs::write(destination, image.url.as_bytes())
                .map_err(|err| ShelfError::Filesystem(err.to_string()))
        }
    }

    #[test]
    fn album_download_numbers_pages() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let id: ComicId = "77".parse().unwrap();

        let result =
            download_album(&PagesClient { pages: 3 }, &id, &root, &JsonOutput).unwrap();
        assert_eq!(result.images, 3);
        assert!(root.join("77/00001.jpg").as_std_path().is_file());
        assert!(root.join("77/00003.jpg").as_std_path().is_file());
    }

    #[test]
    fn album_download_rejects_empty_photo_set() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let id: ComicId = "77".parse().unwrap();

        let err =
            download_album(&PagesClient { pages: 0 }, &id, &root, &JsonOutput).unwrap_err();
        assert!(matches!(err, ShelfError::EmptyPhoto(_)));
    }
}
