//! Tests for playlist lineup indexing

#[cfg(test)]
mod tests {
    use crate::config::DownloadConfig;
    use crate::error::{GrabberError, InputStage};
    use crate::fetch::fetch;
    use crate::m3u_parser::*;
    use std::collections::HashSet;

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_index_basic_playlist() {
        let content = r#"
#EXTM3U
#EXTINF:-1 tvg-id="cnn" group-title="News",CNN
http://example.com/live/user/pass/1.ts
#EXTINF:-1 tvg-id="bbc1" group-title="News",BBC One
http://example.com/live/user/pass/2.ts
"#;
        let index = LineupIndex::from_text(content);
        assert_eq!(index.identifiers, set(&["cnn", "bbc1"]));
        assert_eq!(index.display_names, set(&["cnn", "bbc one"]));
    }

    #[test]
    fn test_index_normalizes_keys() {
        let content = "#EXTM3U\n#EXTINF:-1 tvg-id=\"  BBC1.UK \",   BBC One HD  \nhttp://x/1.ts\n";
        let index = LineupIndex::from_text(content);
        assert!(index.contains_identifier("bbc1.uk"));
        assert!(index.contains_display_name("bbc one hd"));
        assert!(!index.contains_identifier("BBC1.UK"));
    }

    #[test]
    fn test_identifier_attribute_name_is_case_insensitive() {
        let content = r#"#EXTM3U
#EXTINF:-1 TVG-ID="Sky.News",Sky News
http://x/1.ts
#EXTINF:10.000000,Tvg-Id="itv1" tvg-name="ITV 1",ITV
http://x/2.ts
"#;
        let index = LineupIndex::from_text(content);
        assert_eq!(index.identifiers, set(&["sky.news", "itv1"]));
    }

    #[test]
    fn test_missing_identifier_still_contributes_name() {
        let content = r#"#EXTM3U
#EXTINF:-1 group-title="Kids",Cartoon Network
http://x/1.ts
#EXTINF:-1 tvg-id="" tvg-name="Blank",Blank Id Channel
http://x/2.ts
"#;
        let index = LineupIndex::from_text(content);
        assert!(index.identifiers.is_empty());
        assert_eq!(index.display_names, set(&["cartoon network", "blank id channel"]));
    }

    #[test]
    fn test_missing_display_text_contributes_identifier_only() {
        let content = "#EXTM3U\n#EXTINF:-1 tvg-id=\"discovery\"\nhttp://x/1.ts\n#EXTINF:-1 tvg-id=\"nat\",   \nhttp://x/2.ts\n";
        let index = LineupIndex::from_text(content);
        assert_eq!(index.identifiers, set(&["discovery", "nat"]));
        assert!(index.display_names.is_empty());
    }

    #[test]
    fn test_display_text_uses_last_top_level_comma() {
        let content = r#"#EXTM3U
#EXTINF:-1 tvg-id="eurosport" group-title="Sports, Europe",Eurosport 1
http://x/1.ts
"#;
        let index = LineupIndex::from_text(content);
        assert_eq!(index.display_names, set(&["eurosport 1"]));
    }

    #[test]
    fn test_non_entry_lines_are_ignored() {
        let content = r#"#EXTM3U x-tvg-url="http://example.com/epg.xml"
#EXTVLCOPT:network-caching=1000,Not A Channel
#EXTGRP:News
tvg-id="fake",Fake
http://x/1.ts
"#;
        let index = LineupIndex::from_text(content);
        assert!(index.is_empty());
    }

    #[test]
    fn test_index_is_independent_of_entry_order() {
        let forward = "#EXTINF:-1 tvg-id=\"a\",Alpha\nu1\n#EXTINF:-1 tvg-id=\"b\",Beta\nu2\n";
        let reversed = "#EXTINF:-1 tvg-id=\"b\",Beta\nu2\n#EXTINF:-1 tvg-id=\"a\",Alpha\nu1\n";
        assert_eq!(LineupIndex::from_text(forward), LineupIndex::from_text(reversed));
    }

    #[test]
    fn test_duplicate_entries_collapse() {
        let content = "#EXTINF:-1 tvg-id=\"a\",Alpha\nu1\n#EXTINF:-1 tvg-id=\"A\",ALPHA\nu2\n";
        let index = LineupIndex::from_text(content);
        assert_eq!(index.identifiers.len(), 1);
        assert_eq!(index.display_names.len(), 1);
    }

    #[test]
    fn test_byte_order_mark_and_crlf() {
        let content = "\u{feff}#EXTM3U\r\n#EXTINF:-1 tvg-id=\"zdf\",ZDF\r\nhttp://x/zdf.ts\r\n";
        let index = LineupIndex::from_bytes(content.as_bytes());
        assert_eq!(index.identifiers, set(&["zdf"]));
        assert_eq!(index.display_names, set(&["zdf"]));
    }

    #[test]
    fn test_missing_playlist_is_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("playlist.m3u");
        let err = fetch(&missing.to_string_lossy(), InputStage::Playlist, &DownloadConfig::default()).unwrap_err();
        assert!(matches!(err, GrabberError::Input { stage: InputStage::Playlist, .. }));
        assert!(err.to_string().starts_with("playlist source unavailable"));
    }

    #[test]
    fn test_playlist_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("playlist.m3u");
        std::fs::write(&path, "#EXTM3U\n#EXTINF:-1 tvg-id=\"rtl\",RTL\nhttp://x/rtl.ts\n").unwrap();

        let bytes = fetch(&path.to_string_lossy(), InputStage::Playlist, &DownloadConfig::default()).unwrap();
        let index = LineupIndex::from_bytes(&bytes);
        assert!(index.contains_identifier("rtl"));
        assert!(index.contains_display_name("rtl"));
    }
}
