/// State of one file's ingestion (or one deletion), handed to the listener.
///
/// The `new_*` lists hold the ids this operation created, as opposed to ids
/// that already existed. For a removal they hold the artists and genres that
/// were deleted along with the album.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionItem {
    pub album_name: String,
    pub year: Option<i32>,
    pub timestamp: Option<i64>,
    pub album_id: i64,
    pub album_artist_ids: Vec<i64>,
    pub new_album_artist_ids: Vec<i64>,
    pub artist_ids: Vec<i64>,
    pub new_artist_ids: Vec<i64>,
    pub genre_ids: Vec<i64>,
    pub new_genre_ids: Vec<i64>,
    pub track_id: i64,
    /// The album row was created by this operation
    pub new_album: bool,
}

impl CollectionItem {
    pub fn new(album_name: &str, year: Option<i32>, timestamp: Option<i64>) -> Self {
        Self {
            album_name: album_name.to_string(),
            year,
            timestamp,
            ..Default::default()
        }
    }

    pub fn for_album(album_id: i64) -> Self {
        Self {
            album_id,
            ..Default::default()
        }
    }
}
