//! Fan-out of one payload to several outbound channels

use crate::error::{ChanioError, ChanioResult};
use crate::io::{chunks_of, OutboundChannel};
use leap_core::{kerror, TryPushError};

/// Outbound channels that always receive the same messages
pub struct MulticastGroup {
    members: Vec<OutboundChannel>,
}

impl MulticastGroup {
    pub fn new(members: Vec<OutboundChannel>) -> Self {
        Self { members }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> &[OutboundChannel] {
        &self.members
    }

    /// Send to every member, blocking on each member's credit in turn
    pub fn push(&self, payload: Vec<u8>) -> ChanioResult<()> {
        let Some((last, rest)) = self.members.split_last() else {
            return Ok(());
        };
        for m in rest {
            m.push(payload.clone())?;
        }
        last.push(payload)
    }

    /// All or nothing: send only if every member has credit now.
    ///
    /// The payload is handed back when credit is short or when a link
    /// refuses the write. After a write failure the members ahead of the
    /// failing one already hold the message and the rest get their credits
    /// back.
    pub fn try_push(&self, payload: Vec<u8>) -> Result<(), TryPushError<Vec<u8>>> {
        let chunks = chunks_of(&payload);
        let mut taken = 0;
        for m in &self.members {
            if !m.link.credits.try_acquire(chunks) {
                m.link.note_stall();
                break;
            }
            taken += 1;
        }
        if taken < self.members.len() {
            for m in &self.members[..taken] {
                m.link.credits.free(chunks);
            }
            return Err(TryPushError(payload));
        }

        for (i, m) in self.members.iter().enumerate() {
            if let Err((e, _)) = m.link.send(payload.clone(), chunks) {
                kerror!("multicast '{}': {} ({} of {} members sent)", m.name(), e, i, self.members.len());
                for rest in &self.members[i + 1..] {
                    rest.link.credits.free(chunks);
                }
                return Err(TryPushError(payload));
            }
        }
        Ok(())
    }

    /// Smallest credit balance across members
    pub fn available(&self) -> u32 {
        self.members.iter().map(|m| m.credits().available()).min().unwrap_or(0)
    }
}

impl TryFrom<Vec<OutboundChannel>> for MulticastGroup {
    type Error = ChanioError;

    fn try_from(members: Vec<OutboundChannel>) -> ChanioResult<Self> {
        if members.is_empty() {
            return Err(ChanioError::InvalidConfig("multicast group needs a member"));
        }
        Ok(Self::new(members))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChanioConfig;
    use crate::io::ChannelIo;
    use leap_rrr::{ChunkedChannel, PhysicalChannel};
    use std::sync::Arc;

    #[test]
    fn test_all_or_nothing() {
        let (a, b) = ChunkedChannel::loopback_pair();
        let io = ChannelIo::new("a", Arc::new(a), ChanioConfig::new().credits(2)).unwrap();
        let x = io.outbound("x").unwrap();
        let y = io.outbound("y").unwrap();
        // Starve y
        assert!(y.credits().try_acquire(2));

        let group = MulticastGroup::try_from(vec![x, y]).unwrap();
        assert_eq!(group.try_push(vec![1]), Err(TryPushError(vec![1])));
        // x got its credit back
        assert_eq!(group.members()[0].credits().available(), 2);
        assert_eq!(group.available(), 0);

        group.members()[1].credits().free(2);
        group.try_push(vec![5]).unwrap();
        group.push(vec![6]).unwrap();

        let ids: Vec<_> = std::iter::from_fn(|| b.try_read().unwrap()).map(|m| m.service_id).collect();
        assert_eq!(ids, vec![0, 1, 0, 1]);
    }

    #[test]
    fn test_write_failure_is_reported() {
        let (a, _b) = ChunkedChannel::loopback_pair();
        let a = Arc::new(a);
        let io = ChannelIo::new("a", a.clone(), ChanioConfig::new().credits(2)).unwrap();
        let group = MulticastGroup::new(vec![io.outbound("x").unwrap(), io.outbound("y").unwrap()]);
        a.device().close();

        assert_eq!(group.try_push(vec![3]), Err(TryPushError(vec![3])));
        assert!(group.push(vec![4]).is_err());
        for m in group.members() {
            assert_eq!(m.credits().available(), 2);
            assert!(m.credits().is_conserved());
        }
    }

    #[test]
    fn test_empty_group_rejected() {
        assert!(MulticastGroup::try_from(Vec::new()).is_err());
    }
}
