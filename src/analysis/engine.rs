use std::{
    collections::HashSet,
    sync::{Arc, OnceLock},
};

use log::{debug, info};

use super::{
    bounding::{
        bound_privacy_id_contributions, ContributionBounds,
        PartitionAggregationState, PrivacyIdContribution,
    },
    errors::UtilityAnalysisError,
    estimators::{metric_error_estimator, ErrorEstimator},
    extractors::DataExtractors,
    metrics::{
        AggregateErrorMetrics, ErrorMetricKind, ErrorMetricsAccumulator,
        PartitionErrorMetrics,
    },
    params::{AggregateParams, Metric, ValidatedParams},
    selection::{PartitionSelectionErrorEstimator, PartitionSelectionEstimator},
};
use crate::{
    backend::{local::LocalBackend, traits::PipelineBackend},
    budget::{
        request::BudgetRequest,
        traits::{BudgetAccountant, MechanismType},
    },
    mechanisms::noise::{ClosedFormNoise, NoiseKind, NoiseVariance},
    util::shared_types::{PartitionKey, PrivacyId},
};

/// Errors of one partition, in the order of the global result.
pub type PartitionErrors<PK> = (PK, Vec<PartitionErrorMetrics>);

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// With private partitions, also model in each metric's error that the
    /// partition may not be released at all.
    pub account_partition_selection_in_metrics: bool,

    /// Variance of the noise added by the DP mechanisms.
    pub noise_variance: Arc<dyn NoiseVariance>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            account_partition_selection_in_metrics: false,
            noise_variance: Arc::new(ClosedFormNoise),
        }
    }
}

/// Estimates the error DP aggregations would have on a dataset, without
/// running them.
#[derive(Debug, Clone)]
pub struct UtilityAnalysisEngine<B: PipelineBackend> {
    backend: B,
    options: EngineOptions,
}

impl UtilityAnalysisEngine<LocalBackend> {
    pub fn local() -> Self {
        Self::new(LocalBackend::new())
    }
}

impl<B: PipelineBackend> UtilityAnalysisEngine<B> {
    pub fn new(backend: B) -> Self {
        Self::with_options(backend, EngineOptions::default())
    }

    pub fn with_options(backend: B, options: EngineOptions) -> Self {
        Self { backend, options }
    }

    /// Declares the analysis of `col` and returns it as a lazy collection.
    ///
    /// Parameters are validated before anything else happens. Budget is
    /// requested from `budget_accountant` for partition selection (only
    /// without `public_partitions`) and for each metric, in that order. The
    /// returned analysis yields a single element, the list of aggregate
    /// errors in the same order, and can only be materialized once
    /// `compute_budgets()` was called on the accountant.
    pub fn aggregate<A, R, PID, PK, V>(
        &self,
        budget_accountant: &mut A,
        col: B::Collection<R>,
        params: &AggregateParams,
        data_extractors: &DataExtractors<R, PID, PK, V>,
        public_partitions: Option<Vec<PK>>,
    ) -> Result<LazyUtilityAnalysis<B, PK>, UtilityAnalysisError>
    where
        A: BudgetAccountant,
        R: 'static,
        PID: PrivacyId + 'static,
        PK: PartitionKey + 'static,
        V: 'static,
    {
        let validated = params.validate()?;
        info!(
            "Utility analysis of {:?} with {:?} noise, bounds {:?}, {} partitions",
            validated.metrics,
            validated.noise_kind,
            validated.bounds,
            match public_partitions {
                Some(_) => "public",
                None => "private",
            }
        );

        let selection_request = match public_partitions {
            Some(_) => None,
            None => Some(
                budget_accountant.request_budget(MechanismType::Generic)?,
            ),
        };
        let mut metric_requests = Vec::with_capacity(validated.metrics.len());
        for metric in &validated.metrics {
            let request = budget_accountant
                .request_budget(validated.noise_kind.mechanism_type())?;
            metric_requests.push((*metric, request));
        }

        let partitions = self.bound_contributions(
            col,
            &validated,
            data_extractors,
            public_partitions,
        );

        let plan = AnalysisPlan {
            noise_kind: validated.noise_kind,
            bounds: validated.bounds,
            selection_request,
            metric_requests,
            options: self.options.clone(),
            resolved: OnceLock::new(),
        };

        Ok(LazyUtilityAnalysis {
            backend: self.backend.clone(),
            partitions,
            plan: Arc::new(plan),
        })
    }

    /// Extracts, groups and bounds contributions into one state per
    /// partition.
    fn bound_contributions<R, PID, PK, V>(
        &self,
        col: B::Collection<R>,
        validated: &ValidatedParams,
        data_extractors: &DataExtractors<R, PID, PK, V>,
        public_partitions: Option<Vec<PK>>,
    ) -> B::Collection<(PK, PartitionAggregationState)>
    where
        R: 'static,
        PID: PrivacyId + 'static,
        PK: PartitionKey + 'static,
        V: 'static,
    {
        let backend = &self.backend;
        let extractors = data_extractors.clone();
        let col = backend.map(
            col,
            move |record: R| extractors.extract(&record),
            "Extract (privacy_id, partition_key, value)",
        );

        let col = match &public_partitions {
            Some(public) => {
                let public: HashSet<PK> = public.iter().cloned().collect();
                backend.filter(
                    col,
                    move |(_, pk, _): &(PID, PK, V)| public.contains(pk),
                    "Drop non-public partitions",
                )
            }
            None => col,
        };

        let col = backend.map(
            col,
            |(pid, pk, _value): (PID, PK, V)| ((pid, pk), 1u64),
            "Key by (privacy_id, partition_key)",
        );
        let col = backend.combine_per_key::<(PID, PK), u64>(
            col,
            |a, b| a + b,
            "Count contributions per (privacy_id, partition_key)",
        );
        let col = backend.map(
            col,
            |((pid, pk), count): ((PID, PK), u64)| (pid, (pk, count)),
            "Key by privacy_id",
        );
        let col = backend
            .group_by_key::<PID, (PK, u64)>(col, "Group by privacy_id");

        let bounds = validated.bounds;
        let col = backend.flat_map(
            col,
            move |(_pid, contributions): (PID, Vec<(PK, u64)>)| {
                bound_privacy_id_contributions(contributions, &bounds)
            },
            "Simulate contribution bounding",
        );
        let col = backend.map(
            col,
            |(pk, contribution): (PK, PrivacyIdContribution)| {
                (pk, PartitionAggregationState::from(contribution))
            },
            "Partition state per privacy id",
        );

        let col = match public_partitions {
            Some(public) => {
                let empty: Vec<_> = public
                    .into_iter()
                    .map(|pk| (pk, PartitionAggregationState::default()))
                    .collect();
                let empty = backend.to_collection(empty, "Public partitions");
                backend.flatten(col, empty, "Add empty public partitions")
            }
            None => col,
        };

        backend.combine_per_key::<PK, PartitionAggregationState>(
            col,
            PartitionAggregationState::merge,
            "Aggregate per partition",
        )
    }
}

/// Result of [`UtilityAnalysisEngine::aggregate`], computed when the
/// collection returned by `into_collection` or `into_per_partition` is
/// materialized by the backend.
pub struct LazyUtilityAnalysis<B: PipelineBackend, PK: 'static> {
    backend: B,
    partitions: B::Collection<(PK, PartitionAggregationState)>,
    plan: Arc<AnalysisPlan>,
}

impl<B, PK> LazyUtilityAnalysis<B, PK>
where
    B: PipelineBackend,
    PK: PartitionKey + 'static,
{
    /// Collection with exactly one element: the error of each mechanism,
    /// averaged over partitions.
    pub fn into_collection(
        self,
    ) -> B::Collection<Result<Vec<AggregateErrorMetrics>, UtilityAnalysisError>>
    {
        let backend = self.backend.clone();
        let plan = self.plan.clone();
        let per_partition = self.into_per_partition();
        let all_partitions = backend
            .to_list::<Result<PartitionErrors<PK>, UtilityAnalysisError>>(
                per_partition,
                "Collect per-partition errors",
            );
        backend.map(
            all_partitions,
            move |partitions: Vec<
                Result<PartitionErrors<PK>, UtilityAnalysisError>,
            >| plan.reduce(partitions),
            "Reduce errors across partitions",
        )
    }

    /// Collection of the errors of every partition.
    pub fn into_per_partition(
        self,
    ) -> B::Collection<Result<PartitionErrors<PK>, UtilityAnalysisError>> {
        let plan = self.plan;
        self.backend.map(
            self.partitions,
            move |(pk, state): (PK, PartitionAggregationState)| {
                let errors = plan.resolved()?.estimate(&state);
                Ok((pk, errors))
            },
            "Estimate per-partition errors",
        )
    }
}

impl<PK: PartitionKey + 'static> IntoIterator
    for LazyUtilityAnalysis<LocalBackend, PK>
{
    type Item = Result<Vec<AggregateErrorMetrics>, UtilityAnalysisError>;
    type IntoIter = Box<dyn Iterator<Item = Self::Item>>;

    fn into_iter(self) -> Self::IntoIter {
        self.into_collection()
    }
}

/// Budget requests and settings of one `aggregate` call. Estimators are
/// built on first use, once the budget is known.
#[derive(Debug)]
struct AnalysisPlan {
    noise_kind: NoiseKind,
    bounds: ContributionBounds,
    selection_request: Option<BudgetRequest>,
    metric_requests: Vec<(Metric, BudgetRequest)>,
    options: EngineOptions,
    resolved: OnceLock<ResolvedPlan>,
}

#[derive(Debug)]
struct ResolvedPlan {
    selection: Option<PartitionSelectionEstimator>,
    /// Partition selection first if private, then metrics in request order.
    estimators: Vec<Box<dyn ErrorEstimator>>,
    account_selection_in_metrics: bool,
}

impl AnalysisPlan {
    fn resolved(&self) -> Result<&ResolvedPlan, UtilityAnalysisError> {
        if let Some(resolved) = self.resolved.get() {
            return Ok(resolved);
        }
        let resolved = self.resolve()?;
        Ok(self.resolved.get_or_init(|| resolved))
    }

    fn resolve(&self) -> Result<ResolvedPlan, UtilityAnalysisError> {
        let mut estimators: Vec<Box<dyn ErrorEstimator>> = vec![];

        let selection = match &self.selection_request {
            Some(request) => {
                let budget = request.budget()?;
                debug!("Partition selection budget: {budget:?}");
                estimators.push(Box::new(PartitionSelectionErrorEstimator));
                Some(PartitionSelectionEstimator::new(
                    &budget,
                    self.bounds.max_partitions_contributed,
                ))
            }
            None => None,
        };

        for (metric, request) in &self.metric_requests {
            let budget = request.budget()?;
            debug!("{metric:?} budget: {budget:?}");
            estimators.push(metric_error_estimator(
                *metric,
                self.noise_kind,
                &self.bounds,
                &budget,
                self.options.noise_variance.as_ref(),
            )?);
        }

        Ok(ResolvedPlan {
            selection,
            estimators,
            account_selection_in_metrics: self
                .options
                .account_partition_selection_in_metrics,
        })
    }

    fn reduce<PK>(
        &self,
        partitions: Vec<Result<PartitionErrors<PK>, UtilityAnalysisError>>,
    ) -> Result<Vec<AggregateErrorMetrics>, UtilityAnalysisError> {
        // Fails on an unresolved budget even when there are no partitions.
        let resolved = self.resolved()?;

        let mut accumulators: Vec<ErrorMetricsAccumulator> = resolved
            .estimators
            .iter()
            .map(|e| ErrorMetricsAccumulator::new(e.kind()))
            .collect();
        for partition in partitions {
            let (_, errors) = partition?;
            for (accumulator, error) in accumulators.iter_mut().zip(&errors) {
                accumulator.add(error);
            }
        }

        let num_partitions =
            accumulators.first().map_or(0, |a| a.num_partitions());
        info!("Utility analysis done over {num_partitions} partitions");
        Ok(accumulators.iter().map(|a| a.finalize()).collect())
    }
}

impl ResolvedPlan {
    fn estimate(
        &self,
        state: &PartitionAggregationState,
    ) -> Vec<PartitionErrorMetrics> {
        let selection = self.selection.as_ref().map(|s| s.estimate(state));
        let metric_selection = selection
            .as_ref()
            .filter(|_| self.account_selection_in_metrics);

        self.estimators
            .iter()
            .map(|estimator| match estimator.kind() {
                ErrorMetricKind::PartitionSelection => {
                    estimator.estimate(state, selection.as_ref())
                }
                _ => estimator.estimate(state, metric_selection),
            })
            .collect()
    }
}
