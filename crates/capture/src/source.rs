//! 패킷 소스 어댑터 — 커널 인터셉션 시설의 래퍼
//!
//! [`PacketSource`]는 인터셉션 시설을 (원시 바이트, 핸들) 시퀀스와
//! verdict 호출로 추상화합니다. 핸들은 값으로 소비되므로 하나의
//! 핸들이 두 번 verdict되는 일은 타입 수준에서 불가능합니다.
//!
//! # Linux 전용
//! 실제 구현인 [`NfqueueSource`]는 netlink 기반 `nfq` 크레이트를
//! 사용하므로 Linux에서만 동작합니다. 다른 플랫폼에서는 bind 시
//! 에러를 반환합니다.

use bytes::Bytes;

use netwarden_core::error::CaptureError;
use netwarden_core::types::Verdict;

/// 인터셉션 시설에서 패킷을 끌어오고 verdict를 돌려주는 어댑터
///
/// `next()`는 호출 컨텍스트를 블로킹하는 유일한 suspension point입니다.
/// 패킷이 도착하거나 시설이 종료를 알릴 때까지 반환하지 않으며,
/// 종료 시 `Ok(None)`을 반환합니다.
pub trait PacketSource: Send {
    /// 패킷별로 발급되는 불투명 핸들
    ///
    /// verdict 호출이 핸들을 값으로 소비하므로 한 핸들은 정확히
    /// 한 번만 사용됩니다.
    type Handle: Send;

    /// 다음 패킷을 가져옵니다 (블로킹).
    ///
    /// `Ok(None)`은 시설이 종료되어 더 이상 패킷이 없음을 뜻합니다.
    fn next(&mut self) -> Result<Option<(Bytes, Self::Handle)>, CaptureError>;

    /// 핸들에 대한 verdict를 시설에 돌려줍니다.
    ///
    /// Forward는 패킷을 커널 포워딩 경로로 되돌리고, Drop은 폐기합니다.
    fn verdict(&mut self, handle: Self::Handle, verdict: Verdict) -> Result<(), CaptureError>;

    /// 시설에서 언바인드합니다. 멱등해야 합니다.
    fn unbind(&mut self) -> Result<(), CaptureError>;
}

/// NFQUEUE 기반 패킷 소스
///
/// 커널이 지정된 큐로 우회시킨 패킷을 netlink 소켓으로 수신합니다.
/// 이 컴포넌트 스스로는 어떤 네트워크 리슨 소켓도 열지 않습니다.
#[cfg(target_os = "linux")]
pub struct NfqueueSource {
    queue: nfq::Queue,
    queue_id: u16,
    bound: bool,
}

#[cfg(target_os = "linux")]
impl NfqueueSource {
    /// NFQUEUE를 열고 큐 번호에 바인딩합니다.
    ///
    /// # 에러
    /// [`CaptureError::Bind`] — 시설을 사용할 수 없거나 (권한,
    /// 모듈 부재) 큐가 이미 다른 소비자에 바인딩된 경우.
    pub fn bind(queue_id: u16) -> Result<Self, CaptureError> {
        let mut queue = nfq::Queue::open().map_err(|e| CaptureError::Bind {
            queue_id,
            reason: e.to_string(),
        })?;
        queue.bind(queue_id).map_err(|e| CaptureError::Bind {
            queue_id,
            reason: e.to_string(),
        })?;
        tracing::info!(queue_id, "bound to nfqueue");
        Ok(Self {
            queue,
            queue_id,
            bound: true,
        })
    }

    fn to_nfq_verdict(verdict: Verdict) -> nfq::Verdict {
        match verdict {
            Verdict::Forward => nfq::Verdict::Accept,
            Verdict::Drop => nfq::Verdict::Drop,
        }
    }
}

#[cfg(target_os = "linux")]
impl PacketSource for NfqueueSource {
    type Handle = nfq::Message;

    fn next(&mut self) -> Result<Option<(Bytes, Self::Handle)>, CaptureError> {
        if !self.bound {
            return Ok(None);
        }
        let msg = self
            .queue
            .recv()
            .map_err(|e| CaptureError::Recv(e.to_string()))?;
        let payload = Bytes::copy_from_slice(msg.get_payload());
        Ok(Some((payload, msg)))
    }

    fn verdict(&mut self, mut handle: Self::Handle, verdict: Verdict) -> Result<(), CaptureError> {
        handle.set_verdict(Self::to_nfq_verdict(verdict));
        self.queue
            .verdict(handle)
            .map_err(|e| CaptureError::Verdict(e.to_string()))
    }

    fn unbind(&mut self) -> Result<(), CaptureError> {
        if !self.bound {
            return Ok(());
        }
        self.queue
            .unbind(self.queue_id)
            .map_err(|e| CaptureError::Unbind(e.to_string()))?;
        self.bound = false;
        tracing::info!(queue_id = self.queue_id, "unbound from nfqueue");
        Ok(())
    }
}

/// 비-Linux 플랫폼용 스텁 — bind 시점에 에러를 반환합니다.
#[cfg(not(target_os = "linux"))]
pub struct NfqueueSource;

#[cfg(not(target_os = "linux"))]
impl NfqueueSource {
    /// NFQUEUE는 Linux 전용이므로 항상 실패합니다.
    pub fn bind(queue_id: u16) -> Result<Self, CaptureError> {
        let _ = queue_id;
        Err(CaptureError::Unsupported(
            "nfqueue is only available on Linux".to_owned(),
        ))
    }
}

#[cfg(not(target_os = "linux"))]
impl PacketSource for NfqueueSource {
    type Handle = ();

    fn next(&mut self) -> Result<Option<(Bytes, Self::Handle)>, CaptureError> {
        Ok(None)
    }

    fn verdict(&mut self, _handle: Self::Handle, _verdict: Verdict) -> Result<(), CaptureError> {
        Ok(())
    }

    fn unbind(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }
}
