use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Chain, Cursor, Read};
use std::path::Path;

type ChainReader = Chain<Cursor<Vec<u8>>, File>;
type GzipReader = BufReader<MultiGzDecoder<ChainReader>>;
type ZstdReader = BufReader<zstd::Decoder<'static, BufReader<ChainReader>>>;
type PlainReader = BufReader<ChainReader>;

/// Streaming reader over a source log file.
/// Detects gzip (1F 8B 08) and zstd (28 B5 2F FD) compression using magic bytes
pub enum SourceReader {
    Gzip(GzipReader),
    Zstd(ZstdReader),
    Plain(PlainReader),
}

// zstd::Decoder doesn't implement Debug
impl std::fmt::Debug for SourceReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceReader::Gzip(_) => write!(f, "SourceReader::Gzip"),
            SourceReader::Zstd(_) => write!(f, "SourceReader::Zstd"),
            SourceReader::Plain(_) => write!(f, "SourceReader::Plain"),
        }
    }
}

impl BufRead for SourceReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self {
            SourceReader::Gzip(reader) => reader.fill_buf(),
            SourceReader::Zstd(reader) => reader.fill_buf(),
            SourceReader::Plain(reader) => reader.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            SourceReader::Gzip(reader) => reader.consume(amt),
            SourceReader::Zstd(reader) => reader.consume(amt),
            SourceReader::Plain(reader) => reader.consume(amt),
        }
    }
}

impl Read for SourceReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            SourceReader::Gzip(reader) => reader.read(buf),
            SourceReader::Zstd(reader) => reader.read(buf),
            SourceReader::Plain(reader) => reader.read(buf),
        }
    }
}

impl SourceReader {
    /// Open a source log, transparently decompressing gzip and zstd content
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "ZIP archives are not supported, only gzip and zstd; extract {} first",
                    path.display()
                ),
            ));
        }

        let mut file = File::open(path)?;
        let mut head = [0u8; 4];
        let n = file.read(&mut head)?;

        // Put the sniffed bytes back in front of the stream
        let chained = Cursor::new(head[..n].to_vec()).chain(file);

        let is_gzip = n >= 3 && head[..3] == [0x1F, 0x8B, 0x08];
        let is_zstd = n >= 4 && head == [0x28, 0xB5, 0x2F, 0xFD];

        if is_gzip {
            Ok(SourceReader::Gzip(BufReader::new(MultiGzDecoder::new(chained))))
        } else if is_zstd {
            Ok(SourceReader::Zstd(BufReader::new(zstd::Decoder::new(chained)?)))
        } else {
            Ok(SourceReader::Plain(BufReader::new(chained)))
        }
    }
}
