//! 换行分隔 JSON 事件解码器
//!
//! 按字节缓冲，在 `\n` 处切分行，再逐行做 UTF-8 解码与 JSON 解析。
//! `\n` 不会出现在多字节 UTF-8 序列内部，因此在字节层面切分后，
//! 跨 chunk 边界的多字节字符总能完整地落在同一行里。
//!
//! 格式错误的行被计数并丢弃，不会中断运行。

use crate::streaming::error::AuditStreamError;
use crate::streaming::events::AuditEvent;
use crate::streaming::metrics::AuditStreamMetrics;
use crate::streaming::transport::ByteStream;
use chrono::{DateTime, Utc};
use futures::Stream;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::debug;

/// 单行解码结果
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    /// 空行
    Empty,
    Event(AuditEvent),
    /// 非 UTF-8、非 JSON 或形状不符
    Malformed,
}

/// 解码一行（不含换行符）
pub fn decode_line(bytes: &[u8]) -> LineOutcome {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text.trim(),
        Err(_) => return LineOutcome::Malformed,
    };
    if text.is_empty() {
        return LineOutcome::Empty;
    }
    match AuditEvent::parse_line(text) {
        Some(event) => LineOutcome::Event(event),
        None => LineOutcome::Malformed,
    }
}

/// 增量解码器
#[derive(Debug)]
pub struct NdjsonEventDecoder {
    /// 尚未遇到换行的字节
    buffer: Vec<u8>,
    /// `buffer` 中已确认不含换行的前缀长度
    scanned: usize,
    max_line_bytes: usize,
    /// 流结束时是否解析没有换行结尾的最后一行
    flush_trailing_line: bool,
    malformed_lines: u32,
}

impl Default for NdjsonEventDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl NdjsonEventDecoder {
    /// 默认单行上限 (1MB)
    pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            max_line_bytes: Self::DEFAULT_MAX_LINE_BYTES,
            flush_trailing_line: true,
            malformed_lines: 0,
        }
    }

    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    pub fn with_flush_trailing_line(mut self, flush: bool) -> Self {
        self.flush_trailing_line = flush;
        self
    }

    pub fn malformed_lines(&self) -> u32 {
        self.malformed_lines
    }

    /// 当前缓冲的未完成行长度
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// 处理一个 chunk，返回其中所有完整行解出的事件
    pub fn process(&mut self, bytes: &[u8]) -> Vec<AuditEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        let mut consumed = 0;
        let mut search_from = self.scanned;
        while let Some(offset) = self.buffer[search_from..].iter().position(|&b| b == b'\n') {
            let end = search_from + offset;
            let outcome = decode_line(&self.buffer[consumed..end]);
            consumed = end + 1;
            search_from = consumed;
            self.collect(outcome, &mut events);
        }

        if consumed > 0 {
            self.buffer.drain(..consumed);
        }
        self.scanned = self.buffer.len();
        events
    }

    /// 未完成行超过上限时报错
    pub fn check_overflow(&self) -> Result<(), AuditStreamError> {
        if self.buffer.len() > self.max_line_bytes {
            return Err(AuditStreamError::BufferOverflow {
                limit: self.max_line_bytes,
            });
        }
        Ok(())
    }

    /// 流结束，处理残留数据
    pub fn finish(&mut self) -> Vec<AuditEvent> {
        let residual = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        let mut events = Vec::new();
        if residual.is_empty() {
            return events;
        }

        if self.flush_trailing_line {
            let outcome = decode_line(&residual);
            self.collect(outcome, &mut events);
        } else {
            debug!(bytes = residual.len(), "丢弃没有换行结尾的残留数据");
        }
        events
    }

    fn collect(&mut self, outcome: LineOutcome, events: &mut Vec<AuditEvent>) {
        match outcome {
            LineOutcome::Event(event) => events.push(event),
            LineOutcome::Empty => {}
            LineOutcome::Malformed => {
                self.malformed_lines += 1;
                debug!(malformed_lines = self.malformed_lines, "丢弃格式错误的行");
            }
        }
    }
}

/// 解码后的事件流
///
/// 包装字节流，按到达顺序产出事件；字节流出错或单行溢出时产出一次错误后结束。
pub struct DecodedEventStream {
    source: ByteStream,
    decoder: NdjsonEventDecoder,
    pending: VecDeque<AuditEvent>,
    pending_error: Option<AuditStreamError>,
    metrics: AuditStreamMetrics,
    finished: bool,
}

/// 将字节流解码为事件流
pub fn decode(source: ByteStream, decoder: NdjsonEventDecoder) -> DecodedEventStream {
    DecodedEventStream {
        source,
        decoder,
        pending: VecDeque::new(),
        pending_error: None,
        metrics: AuditStreamMetrics::new(),
        finished: false,
    }
}

impl DecodedEventStream {
    /// 以请求发起时刻作为指标的起点
    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.metrics.start_time = started_at;
        self
    }

    pub fn metrics(&self) -> &AuditStreamMetrics {
        &self.metrics
    }

    pub fn decoder(&self) -> &NdjsonEventDecoder {
        &self.decoder
    }

    fn absorb(&mut self, events: Vec<AuditEvent>) {
        self.metrics.record_events(events.len());
        self.metrics
            .set_malformed_lines(self.decoder.malformed_lines());
        self.pending.extend(events);
    }
}

impl Stream for DecodedEventStream {
    type Item = Result<AuditEvent, AuditStreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(event) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }
            if let Some(error) = this.pending_error.take() {
                return Poll::Ready(Some(Err(error)));
            }
            if this.finished {
                return Poll::Ready(None);
            }

            match this.source.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.metrics.record_chunk(bytes.len());
                    let events = this.decoder.process(&bytes);
                    this.absorb(events);
                    if let Err(error) = this.decoder.check_overflow() {
                        this.finished = true;
                        this.metrics.finish();
                        this.pending_error = Some(error);
                    }
                }
                Poll::Ready(Some(Err(error))) => {
                    this.finished = true;
                    this.metrics.finish();
                    this.pending_error = Some(error);
                }
                Poll::Ready(None) => {
                    this.finished = true;
                    let events = this.decoder.finish();
                    this.absorb(events);
                    this.metrics.finish();
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::{stream, StreamExt};

    const P1: &str = r#"{"type":"progress","bucket":"technicalCrawlability","tests":[{"name":"T1","status":"pass","score":80,"message":"ok"}],"completed":1,"total":5}"#;
    const P2: &str = r#"{"type":"progress","bucket":"contentQuality","tests":[{"name":"C1","status":"warning","score":60,"message":"thin"}],"completed":2,"total":5}"#;

    fn byte_stream(chunks: Vec<Vec<u8>>) -> ByteStream {
        Box::pin(stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok::<_, AuditStreamError>(Bytes::from(c))),
        ))
    }

    async fn collect(stream: DecodedEventStream) -> Vec<Result<AuditEvent, AuditStreamError>> {
        stream.collect().await
    }

    #[test]
    fn test_decode_line_outcomes() {
        assert_eq!(decode_line(b""), LineOutcome::Empty);
        assert_eq!(decode_line(b"   \r"), LineOutcome::Empty);
        assert_eq!(decode_line(b"{oops"), LineOutcome::Malformed);
        assert_eq!(decode_line(&[0xff, 0xfe]), LineOutcome::Malformed);
        assert!(matches!(
            decode_line(format!("  {}\r", P1).as_bytes()),
            LineOutcome::Event(AuditEvent::Progress(_))
        ));
    }

    #[test]
    fn test_process_splits_lines() {
        let mut decoder = NdjsonEventDecoder::new();
        let input = format!("{}\n\n{}\n", P1, P2);
        let events = decoder.process(input.as_bytes());
        assert_eq!(events.len(), 2);
        assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn test_partial_line_is_held() {
        let mut decoder = NdjsonEventDecoder::new();
        let (head, tail) = P1.split_at(20);
        assert!(decoder.process(head.as_bytes()).is_empty());
        assert_eq!(decoder.buffered_len(), head.len());
        let events = decoder.process(format!("{}\n", tail).as_bytes());
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_malformed_line_between_valid_lines() {
        let mut decoder = NdjsonEventDecoder::new();
        let input = format!("{}\n{{\"type\":\"progress\",broken\n{}\n", P1, P2);
        let events = decoder.process(input.as_bytes());
        assert_eq!(events.len(), 2);
        assert_eq!(decoder.malformed_lines(), 1);
        match (&events[0], &events[1]) {
            (AuditEvent::Progress(a), AuditEvent::Progress(b)) => {
                assert_eq!(a.completed, 1);
                assert_eq!(b.completed, 2);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let line = r#"{"type":"error","error":"échec — 失败"}"#;
        let bytes = format!("{}\n", line).into_bytes();
        // 把 "失" 的三个字节拆到两个 chunk 中
        let split = line.find('失').unwrap() + 1;

        let mut decoder = NdjsonEventDecoder::new();
        assert!(decoder.process(&bytes[..split]).is_empty());
        let events = decoder.process(&bytes[split..]);
        assert_eq!(events, vec![AuditEvent::Error("échec — 失败".to_string())]);
        assert_eq!(decoder.malformed_lines(), 0);
    }

    #[test]
    fn test_finish_flushes_trailing_line() {
        let mut decoder = NdjsonEventDecoder::new();
        assert!(decoder.process(P1.as_bytes()).is_empty());
        assert_eq!(decoder.finish().len(), 1);
        assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn test_finish_can_drop_trailing_line() {
        let mut decoder = NdjsonEventDecoder::new().with_flush_trailing_line(false);
        assert!(decoder.process(P1.as_bytes()).is_empty());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_overflow_detected() {
        let mut decoder = NdjsonEventDecoder::new().with_max_line_bytes(8);
        decoder.process(b"0123456789");
        assert_eq!(
            decoder.check_overflow(),
            Err(AuditStreamError::BufferOverflow { limit: 8 })
        );
    }

    #[test]
    fn test_long_line_in_small_chunks_scans_incrementally() {
        let line = format!("{}\n", P1);
        let mut decoder = NdjsonEventDecoder::new();
        let mut events = Vec::new();
        for chunk in line.as_bytes().chunks(3) {
            events.extend(decoder.process(chunk));
            // 未完成行已整体扫描过，下次只需检查新到的字节
            assert_eq!(decoder.scanned, decoder.buffered_len());
        }
        assert_eq!(events.len(), 1);
        assert_eq!(decoder.buffered_len(), 0);

        // 同一 chunk 内一行结束、下一行开始
        let mut decoder = NdjsonEventDecoder::new();
        let head = format!("{}\n{}", P1, &P2[..10]);
        assert_eq!(decoder.process(head.as_bytes()).len(), 1);
        assert_eq!(decoder.scanned, 10);
        assert_eq!(decoder.process(format!("{}\n", &P2[10..]).as_bytes()).len(), 1);
        assert_eq!(decoder.scanned, 0);
    }

    #[tokio::test]
    async fn test_metrics_measured_from_request_start() {
        let started_at = chrono::Utc::now() - chrono::Duration::milliseconds(250);
        let input = format!("{}\n", P1).into_bytes();
        let mut stream = decode(byte_stream(vec![input]), NdjsonEventDecoder::new())
            .with_started_at(started_at);
        while stream.next().await.is_some() {}

        assert_eq!(stream.metrics().start_time, started_at);
        assert!(stream.metrics().ttfb_ms.unwrap() >= 250);
    }

    #[tokio::test]
    async fn test_stream_yields_events_in_order() {
        let input = format!("{}\nnot-json\n{}\n", P1, P2).into_bytes();
        let chunks: Vec<Vec<u8>> = input.chunks(7).map(|c| c.to_vec()).collect();
        let stream = decode(byte_stream(chunks), NdjsonEventDecoder::new());

        let items = collect(stream).await;
        assert_eq!(items.len(), 2);
        let completed: Vec<u32> = items
            .into_iter()
            .map(|item| match item {
                Ok(AuditEvent::Progress(p)) => p.completed,
                other => panic!("unexpected: {:?}", other),
            })
            .collect();
        assert_eq!(completed, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_stream_source_error_after_events() {
        let source: ByteStream = Box::pin(stream::iter(vec![
            Ok(Bytes::from(format!("{}\n", P1))),
            Err(AuditStreamError::Network("reset".into())),
            Ok(Bytes::from(format!("{}\n", P2))),
        ]));
        let mut stream = decode(source, NdjsonEventDecoder::new());

        assert!(matches!(stream.next().await, Some(Ok(AuditEvent::Progress(_)))));
        assert_eq!(
            stream.next().await,
            Some(Err(AuditStreamError::Network("reset".into())))
        );
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_stream_metrics() {
        let input = format!("{}\n???\n{}", P1, P2).into_bytes();
        let mut stream = decode(byte_stream(vec![input]), NdjsonEventDecoder::new());
        while stream.next().await.is_some() {}

        let metrics = stream.metrics();
        assert_eq!(metrics.chunk_count, 1);
        assert_eq!(metrics.event_count, 2);
        assert_eq!(metrics.malformed_line_count, 1);
        assert!(metrics.is_finished());
    }
}
