//! Push-based pipeline stages.
//!
//! A stage consumes items one at a time and may emit any number of outputs per
//! input. Stages compose with [`Stage::chain`]; nothing here depends on an I/O
//! runtime, so the same chain runs from a file loop or from live chunks.

/// A single pipeline stage.
pub trait Stage<In> {
    type Output;
    type Error;

    /// Consumes one item and returns whatever became ready.
    fn process(&mut self, item: In) -> Result<Vec<Self::Output>, Self::Error>;

    /// Flushes buffered state at end of stream.
    fn finalize(&mut self) -> Result<Vec<Self::Output>, Self::Error>;

    /// Feeds every output of `self` into `next`.
    fn chain<B>(self, next: B) -> Chain<Self, B>
    where
        Self: Sized,
        B: Stage<Self::Output>,
    {
        Chain { first: self, second: next }
    }
}

/// Two stages run back to back.
#[derive(Debug)]
pub struct Chain<A, B> {
    first: A,
    second: B,
}

impl<A, B> Chain<A, B> {
    pub const fn first(&self) -> &A {
        &self.first
    }

    pub fn first_mut(&mut self) -> &mut A {
        &mut self.first
    }

    pub const fn second(&self) -> &B {
        &self.second
    }

    pub fn second_mut(&mut self) -> &mut B {
        &mut self.second
    }

    pub fn into_parts(self) -> (A, B) {
        (self.first, self.second)
    }
}

impl<In, A, B> Stage<In> for Chain<A, B>
where
    A: Stage<In>,
    B: Stage<A::Output>,
    B::Error: From<A::Error>,
{
    type Output = B::Output;
    type Error = B::Error;

    fn process(&mut self, item: In) -> Result<Vec<Self::Output>, Self::Error> {
        let mut out = Vec::new();
        for mid in self.first.process(item)? {
            out.extend(self.second.process(mid)?);
        }
        Ok(out)
    }

    fn finalize(&mut self) -> Result<Vec<Self::Output>, Self::Error> {
        let mut out = Vec::new();
        for mid in self.first.finalize()? {
            out.extend(self.second.process(mid)?);
        }
        out.extend(self.second.finalize()?);
        Ok(out)
    }
}
