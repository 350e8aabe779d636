#![cfg(windows)]
#![allow(unsafe_code)]

//! Windows [`WordHost`] backed by the system IFilter for `.doc`.
//!
//! Each session initialises COM on the calling worker thread and
//! uninitialises it on drop; the loaded filter is released when the document
//! is dropped, which always happens before its session.

use crate::legacy_word::{WordDocument, WordHost, WordSession};
use crate::ExtractError;
use std::collections::VecDeque;
use std::ffi::c_void;
use std::marker::PhantomData;
use std::path::Path;
use windows::Win32::Foundation::S_OK;
use windows::Win32::Storage::IndexServer::{
    CHUNK_TEXT, FILTER_E_EMBEDDING_UNAVAILABLE, FILTER_E_END_OF_CHUNKS,
    FILTER_E_LINK_UNAVAILABLE, FILTER_E_NO_MORE_TEXT, FILTER_S_LAST_TEXT,
    IFILTER_INIT_CANON_PARAGRAPHS, IFILTER_INIT_CANON_SPACES, IFilter, LoadIFilter, STAT_CHUNK,
};
use windows::Win32::System::Com::{CoInitialize, CoUninitialize};
use windows::core::{HSTRING, Interface, PCWSTR, PWSTR};

const TEXT_BUFFER: usize = 4096;

#[derive(Debug, PartialEq, Eq)]
enum ChunkStatus {
    Ready,
    /// Embedded object or link the filter cannot open; the rest of the
    /// document is still readable.
    Skip,
    End,
    Failed,
}

fn chunk_status(hr: i32) -> ChunkStatus {
    match hr {
        _ if hr == S_OK.0 => ChunkStatus::Ready,
        _ if hr == FILTER_E_END_OF_CHUNKS.0 => ChunkStatus::End,
        _ if hr == FILTER_E_EMBEDDING_UNAVAILABLE.0 || hr == FILTER_E_LINK_UNAVAILABLE.0 => {
            ChunkStatus::Skip
        }
        _ => ChunkStatus::Failed,
    }
}

#[derive(Debug, PartialEq, Eq)]
enum TextStatus {
    More,
    /// Text in the buffer is valid and nothing follows in this chunk.
    Last,
    Done,
    Failed,
}

fn text_status(hr: i32) -> TextStatus {
    match hr {
        _ if hr == S_OK.0 => TextStatus::More,
        _ if hr == FILTER_S_LAST_TEXT.0 => TextStatus::Last,
        _ if hr == FILTER_E_NO_MORE_TEXT.0 => TextStatus::Done,
        _ => TextStatus::Failed,
    }
}

pub struct IFilterHost;

impl WordHost for IFilterHost {
    fn name(&self) -> &'static str {
        "ifilter"
    }

    fn launch(&self) -> Result<Box<dyn WordSession>, ExtractError> {
        // SAFETY: paired with CoUninitialize in `IFilterSession::drop` when
        // this call took a reference; RPC_E_CHANGED_MODE leaves it untouched.
        let initialized = unsafe { CoInitialize(None) }.is_ok();
        Ok(Box::new(IFilterSession {
            initialized,
            _thread_bound: PhantomData,
        }))
    }
}

struct IFilterSession {
    initialized: bool,
    /// COM apartments are per thread.
    _thread_bound: PhantomData<*const ()>,
}

impl Drop for IFilterSession {
    fn drop(&mut self) {
        if self.initialized {
            // SAFETY: balances the successful CoInitialize in `launch`.
            unsafe { CoUninitialize() };
        }
    }
}

impl WordSession for IFilterSession {
    fn open<'s>(&'s mut self, path: &Path) -> Result<Box<dyn WordDocument + 's>, ExtractError> {
        let wide = HSTRING::from(path.as_os_str());
        let mut raw: *mut c_void = std::ptr::null_mut();

        // SAFETY: `wide` outlives the call and `raw` is a valid out pointer.
        unsafe { LoadIFilter(PCWSTR(wide.as_ptr()), None, &mut raw) }
            .map_err(|e| ExtractError::Open(format!("LoadIFilter: {e}")))?;
        if raw.is_null() {
            return Err(ExtractError::Open("LoadIFilter returned no filter".into()));
        }
        // SAFETY: LoadIFilter succeeded, so `raw` owns one IFilter reference.
        let filter = unsafe { IFilter::from_raw(raw) };

        let flags = (IFILTER_INIT_CANON_PARAGRAPHS.0 | IFILTER_INIT_CANON_SPACES.0) as u32;
        let mut flags_out = 0u32;
        // SAFETY: plain COM call on a live interface.
        let hr = unsafe { filter.Init(flags, &[], &mut flags_out) };
        if hr != S_OK.0 {
            return Err(ExtractError::Open(format!("IFilter::Init failed with 0x{hr:08x}")));
        }

        Ok(Box::new(IFilterDocument {
            filter,
            pending: VecDeque::new(),
            partial: String::new(),
            exhausted: false,
            _session: PhantomData,
        }))
    }
}

struct IFilterDocument<'s> {
    filter: IFilter,
    pending: VecDeque<String>,
    partial: String,
    exhausted: bool,
    _session: PhantomData<&'s mut IFilterSession>,
}

impl IFilterDocument<'_> {
    /// Pull the next text chunk, splitting it into paragraphs.
    fn fill(&mut self) -> Result<(), ExtractError> {
        loop {
            let mut stat = STAT_CHUNK::default();
            // SAFETY: `stat` is a valid out parameter.
            let hr = unsafe { self.filter.GetChunk(&mut stat) };
            match chunk_status(hr) {
                ChunkStatus::Ready => {}
                ChunkStatus::Skip => continue,
                ChunkStatus::End => {
                    self.exhausted = true;
                    let rest = std::mem::take(&mut self.partial);
                    self.pending.push_back(rest);
                    return Ok(());
                }
                ChunkStatus::Failed => {
                    return Err(ExtractError::Decode(format!("GetChunk failed with 0x{hr:08x}")));
                }
            }
            if stat.flags.0 & CHUNK_TEXT.0 != CHUNK_TEXT.0 {
                continue;
            }

            let mut chunk = String::new();
            loop {
                let mut buf = [0u16; TEXT_BUFFER];
                let mut count = TEXT_BUFFER as u32;
                // SAFETY: `buf` holds `count` UTF-16 units.
                let hr = unsafe { self.filter.GetText(&mut count, PWSTR(buf.as_mut_ptr())) };
                let status = text_status(hr);
                match status {
                    TextStatus::Done => break,
                    TextStatus::Failed => {
                        return Err(ExtractError::Decode(format!("GetText failed with 0x{hr:08x}")));
                    }
                    TextStatus::More | TextStatus::Last => {}
                }
                let count = (count as usize).min(TEXT_BUFFER);
                chunk.push_str(&String::from_utf16_lossy(&buf[..count]));
                if status == TextStatus::Last || count == 0 {
                    break;
                }
            }

            self.partial.push_str(&chunk);
            let mut pieces: Vec<&str> = self.partial.split(['\r', '\n', '\u{2029}']).collect();
            let tail = pieces.pop().unwrap_or_default().to_string();
            if pieces.is_empty() {
                continue;
            }
            self.pending.extend(pieces.into_iter().map(str::to_string));
            self.partial = tail;
            return Ok(());
        }
    }
}

impl WordDocument for IFilterDocument<'_> {
    fn next_paragraph(&mut self) -> Option<Result<String, ExtractError>> {
        while self.pending.is_empty() && !self.exhausted {
            if let Err(e) = self.fill() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
        self.pending.pop_front().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_text_still_carries_text() {
        assert_eq!(text_status(FILTER_S_LAST_TEXT.0), TextStatus::Last);
        assert_eq!(text_status(S_OK.0), TextStatus::More);
        assert_eq!(text_status(FILTER_E_NO_MORE_TEXT.0), TextStatus::Done);
        assert_eq!(text_status(-1), TextStatus::Failed);
    }

    #[test]
    fn unavailable_embeddings_and_links_are_skipped() {
        assert_eq!(chunk_status(FILTER_E_EMBEDDING_UNAVAILABLE.0), ChunkStatus::Skip);
        assert_eq!(chunk_status(FILTER_E_LINK_UNAVAILABLE.0), ChunkStatus::Skip);
        assert_eq!(chunk_status(FILTER_E_END_OF_CHUNKS.0), ChunkStatus::End);
        assert_eq!(chunk_status(S_OK.0), ChunkStatus::Ready);
        assert_eq!(chunk_status(-1), ChunkStatus::Failed);
    }
}
